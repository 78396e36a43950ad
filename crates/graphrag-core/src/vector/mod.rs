//! Vector index access
//!
//! The index itself runs out of process; [`HttpVectorIndex`] talks to it over
//! REST. [`InMemoryVectorIndex`] implements the same trait in process.

mod http;
mod index;
mod memory;
mod record;

pub use http::{DEFAULT_INDEX_TIMEOUT_SECS, HttpVectorIndex, HttpVectorIndexBuilder};
pub use index::{SimilarityQuery, SimilarityScale, VectorIndex};
pub use memory::{CATEGORY_KEY, InMemoryVectorIndex};
pub use record::{Collection, EMBEDDING_VERSION, EmbeddingRecord, IndexHit};
