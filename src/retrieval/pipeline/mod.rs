//! Retrieval pipeline: backend wiring and the fused-result cache.

pub mod cache;
pub mod core;

pub use cache::FusionCache;
pub use self::core::{PipelineHealth, PreparedContext, RetrievalBackends, RetrievalPipeline};
