//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::retrieval::core::config::EngineConfig;
use crate::retrieval::core::errors::RetrievalResult;
use crate::retrieval::pipeline::RetrievalPipeline;

/// Shared application state.
pub struct AppState {
    /// Retrieval pipeline serving every request.
    pub pipeline: RetrievalPipeline,
}

impl AppState {
    /// Wrap an existing pipeline.
    #[must_use]
    pub fn new(pipeline: RetrievalPipeline) -> Arc<Self> {
        Arc::new(Self { pipeline })
    }

    /// Build the `SQLite`-backed pipeline and load its resolver caches.
    ///
    /// A failed cache load is only logged; fusion retries it on the next request.
    ///
    /// # Errors
    /// Returns an error if the pipeline cannot be created.
    pub async fn from_config(config: EngineConfig) -> RetrievalResult<Arc<Self>> {
        let pipeline = RetrievalPipeline::from_config(config).await?;
        if let Err(err) = pipeline.init().await {
            tracing::warn!(error = %err, "resolver caches not loaded at startup");
        }
        Ok(Self::new(pipeline))
    }
}
