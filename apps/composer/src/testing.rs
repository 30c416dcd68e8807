//! Test fixtures: scripted stand-ins for the external services plus catalog helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::composition::models::{Props, SectionComposition};
use crate::image_client::{ImageAsset, ImageError, ImageRequest, ImageService};
use crate::llm_client::{GenerationRequest, GenerativeService, LlmError};
use crate::patterns::models::{Pattern, PatternCategory, Slot, SlotKind};
use crate::patterns::registry::PatternRegistry;

type Handler = Box<dyn Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync>;

/// Generative service that replays queued answers or answers through a handler.
pub struct ScriptedLlm {
    queue: Mutex<VecDeque<Result<String, LlmError>>>,
    handler: Option<Handler>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(answers: Vec<Result<String, LlmError>>) -> Self {
        Self {
            queue: Mutex::new(answers.into()),
            handler: None,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_handler(
        handler: impl Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::new(Vec::new())
        }
    }

    /// Every call fails as if the service were down.
    pub fn unavailable() -> Self {
        Self::with_handler(|_| {
            Err(LlmError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            })
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeService for ScriptedLlm {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(request.full_prompt());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(handler) = &self.handler {
            return handler(request);
        }
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyContent))
    }

    fn model_id(&self) -> &str {
        "scripted-llm"
    }
}

/// Image service that records concurrency and returns deterministic URLs.
///
/// Prompts containing "fail" are rejected; prompts containing "cached" come back as cache hits;
/// prompts containing "slow" stall for a minute before answering.
#[derive(Default)]
pub struct FakeImageService {
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub delay: Option<Duration>,
}

impl FakeImageService {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageService for FakeImageService {
    async fn synthesize(&self, request: &ImageRequest) -> Result<ImageAsset, ImageError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if request.prompt.contains("slow") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if request.prompt.contains("fail") {
            return Err(ImageError::Api {
                status: 500,
                message: "synthesis failed".to_string(),
            });
        }
        Ok(ImageAsset {
            url: format!("https://img.test/{n}.png"),
            cached: request.prompt.contains("cached"),
        })
    }

    fn model_id(&self) -> &str {
        "fake-images"
    }
}

pub fn builtin_registry() -> PatternRegistry {
    PatternRegistry::builtin().expect("built-in catalog must load")
}

pub fn shared_registry() -> Arc<PatternRegistry> {
    Arc::new(builtin_registry())
}

pub fn registry_of(patterns: Vec<Pattern>) -> PatternRegistry {
    PatternRegistry::from_patterns(patterns).expect("test catalog must load")
}

/// Minimal valid pattern with a single required `title` slot.
pub fn pattern(id: &str, category: PatternCategory, tags: &[&str]) -> Pattern {
    Pattern {
        id: id.to_string(),
        name: id.to_string(),
        category,
        description: format!("{id} test pattern"),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        variants: Vec::new(),
        slots: vec![Slot::new("title", SlotKind::Text)
            .required()
            .with_default(json!("Default title"))],
        image_prompt: None,
    }
}

/// A complete, export-ready `features-icon-grid` section.
pub fn icon_grid_section() -> SectionComposition {
    let mut props = Props::new();
    props.insert("title".to_string(), json!("Why teams switch"));
    props.insert("subtitle".to_string(), json!("Three reasons in one screen."));
    props.insert(
        "features".to_string(),
        json!([
            {"title": "Fast", "description": "Deploys in seconds.", "icon": "zap"},
            {"title": "Safe", "description": "Rollbacks built in.", "icon": "shield"}
        ]),
    );
    props.insert("columns".to_string(), json!(3));
    let mut section = SectionComposition::new("features-icon-grid", props);
    section.intent = Some(PatternCategory::Features);
    section
}
