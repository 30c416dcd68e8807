use std::sync::Arc;

use crate::composition::composer::{Composer, ComposerSettings};
use crate::image_client::ImageService;
use crate::llm_client::GenerativeService;
use crate::patterns::registry::PatternRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PatternRegistry>,
    /// Pluggable generative service. Production: `LlmClient`.
    pub llm: Arc<dyn GenerativeService>,
    /// Pluggable image service. `DisabledImageService` when no endpoint is configured.
    pub images: Arc<dyn ImageService>,
    pub settings: ComposerSettings,
}

impl AppState {
    /// A composer sharing this state's registry and services.
    pub fn composer(&self) -> Composer {
        Composer::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.llm),
            Arc::clone(&self.images),
            self.settings,
        )
    }
}
