//! Cross-type search over entities, relations and topics

mod orchestrator;
mod result;

pub use orchestrator::{
    HYDRATION_CHUNK_SIZE, HYDRATION_CONCURRENCY, OVERFETCH_FACTOR, SearchOrchestrator,
    SearchOrchestratorBuilder,
};
pub use result::{
    RelationHit, ResultKind, ResultPayload, SearchResult, merge_results, per_type_quota,
    rank_and_truncate, rank_order,
};
