//! Composition data model: the engine's terminal output and its audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::composition::request::Spacing;
use crate::patterns::models::{PatternCategory, Slot};

/// Prefix marking a section synthesized by the gap filler rather than a registry pattern.
pub const CUSTOM_PATTERN_PREFIX: &str = "custom:";

/// Prefix for image values that still need to be generated.
pub const IMAGE_PLACEHOLDER_PREFIX: &str = "placeholder:";

/// Property bag of a section, keyed by slot name.
pub type Props = Map<String, Value>;

// ────────────────────────────────────────────────────────────────────────────
// Sections and pages
// ────────────────────────────────────────────────────────────────────────────

/// Inline schema carried by gap-filled sections in place of a registry pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSchema {
    pub name: String,
    pub category: PatternCategory,
    #[serde(default)]
    pub description: String,
    /// Free-text structural description for the renderer, e.g. "two-column split".
    #[serde(default)]
    pub layout: String,
    pub slots: Vec<Slot>,
}

/// One instantiated section: a pattern reference plus concrete property values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionComposition {
    pub id: Uuid,
    pub pattern_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub props: Props,
    /// The category this section was planned for, checked against the pattern's category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<PatternCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_schema: Option<CustomSchema>,
}

impl SectionComposition {
    pub fn new(pattern_id: impl Into<String>, props: Props) -> Self {
        Self {
            id: Uuid::new_v4(),
            pattern_id: pattern_id.into(),
            variant_id: None,
            props,
            intent: None,
            custom_schema: None,
        }
    }

    /// True for gap-filled sections whose pattern id is a synthetic marker.
    pub fn is_custom(&self) -> bool {
        is_custom_pattern_id(&self.pattern_id)
    }
}

pub fn is_custom_pattern_id(pattern_id: &str) -> bool {
    pattern_id.starts_with(CUSTOM_PATTERN_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageComposition {
    pub route: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Layout hint for the renderer, e.g. "landing", "docs", "app-shell".
    #[serde(default)]
    pub layout: String,
    /// Section order is significant and preserved end to end.
    pub sections: Vec<SectionComposition>,
}

// ────────────────────────────────────────────────────────────────────────────
// Project
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub background: String,
    pub foreground: String,
    pub muted: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontScheme {
    pub heading: String,
    pub body: String,
    pub mono: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStyles {
    pub colors: ColorScheme,
    pub fonts: FontScheme,
    pub spacing: Spacing,
    pub border_radius: String,
    pub dark_mode: bool,
}

/// Where a selection decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Model,
    Fallback,
    GapFill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedAlternative {
    pub pattern_id: String,
    #[serde(default)]
    pub reason: String,
}

/// Append-only audit record of one selection decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReasoning {
    pub page_route: String,
    pub section_index: usize,
    pub category: PatternCategory,
    pub chosen_pattern_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub rationale: String,
    #[serde(default)]
    pub rejected: Vec<RejectedAlternative>,
    pub source: DecisionSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageStats {
    pub requested: usize,
    pub generated: usize,
    /// Cache hits, also counted in `generated`.
    pub cached: usize,
    pub failed: usize,
    /// Tasks never started because the run was cancelled.
    pub skipped: usize,
}

impl ImageStats {
    pub fn merge(&mut self, other: &ImageStats) {
        self.requested += other.requested;
        self.generated += other.generated;
        self.cached += other.cached;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionStats {
    pub pages: usize,
    pub sections: usize,
    pub fallback_selections: usize,
    pub gap_filled_sections: usize,
    pub repaired_props: usize,
    pub images: ImageStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub text_model: String,
    pub image_model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionMetadata {
    pub generated_at: DateTime<Utc>,
    pub seed: u64,
    pub models: ModelInfo,
    pub reasoning: Vec<PatternReasoning>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub stats: CompositionStats,
}

/// Terminal output of the engine: pages, global styles and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectComposition {
    pub pages: Vec<PageComposition>,
    pub styles: GlobalStyles,
    pub metadata: CompositionMetadata,
}

// ────────────────────────────────────────────────────────────────────────────
// Stage outcome
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of a stage that calls the generative service.
///
/// `Fallback` is a first-class branch: the value was produced by the
/// deterministic path because the service failed or returned unusable data.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage<T> {
    Generated(T),
    Fallback { value: T, reason: String },
}

impl<T> Stage<T> {
    pub fn into_value(self) -> T {
        match self {
            Stage::Generated(value) | Stage::Fallback { value, .. } => value,
        }
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Stage::Generated(_) => None,
            Stage::Fallback { reason, .. } => Some(reason),
        }
    }
}

#[cfg(test)]
impl<T> Stage<T> {
    pub fn value(&self) -> &T {
        match self {
            Stage::Generated(value) | Stage::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Stage::Fallback { .. })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Value helpers
// ────────────────────────────────────────────────────────────────────────────

/// True if an image value still needs generating: empty, or a recognized placeholder.
pub fn is_image_placeholder(value: &Value) -> bool {
    let src = match value {
        Value::Null => return true,
        Value::String(s) => s.as_str(),
        Value::Object(o) => match o.get("src").or_else(|| o.get("url")) {
            Some(Value::String(s)) => s.as_str(),
            _ => return true,
        },
        _ => return false,
    };

    let src = src.trim();
    src.is_empty()
        || src.starts_with(IMAGE_PLACEHOLDER_PREFIX)
        || src.starts_with("https://placehold.co")
        || src.starts_with("https://via.placeholder.com")
        || src.contains("/placeholder.")
        || src.contains("{{")
}

/// True for null, blank strings and empty arrays/objects.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
