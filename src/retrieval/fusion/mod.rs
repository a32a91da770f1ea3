//! Multi-source fusion: the engine, rank fusion and request metrics.

pub mod engine;
pub mod metrics;
pub mod rrf;

pub use engine::{FusionEngine, FusionOutcome, FusionRetrievers};
pub use metrics::{FailedRetrieval, FusionMetrics, FusionStats, RetrieverMetrics};
pub use rrf::{FusedResult, RankedList, RrfParams};
