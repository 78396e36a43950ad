//! Vector math over embeddings

use crate::error::{Error, Result};

/// Fail with `DimensionMismatch` unless `vector` has `expected` components
pub fn validate_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Cosine similarity in [-1, 1].
///
/// Vectors of different length are never compared. A zero vector has no
/// direction and scores 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    validate_dimension(b, a.len())?;

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot_product / (magnitude_a * magnitude_b))
}

/// Weighted element-wise sum, e.g. title 0.4 and content 0.6
pub fn combine_weighted_embeddings(
    a: &[f32],
    b: &[f32],
    weight_a: f32,
    weight_b: f32,
) -> Result<Vec<f32>> {
    validate_dimension(b, a.len())?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| x * weight_a + y * weight_b)
        .collect())
}

/// Scale to unit length; zero vectors are returned unchanged
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
