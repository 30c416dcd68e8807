//! Pattern catalog data model: categories, slots and pattern definitions.
//!
//! Patterns are built once when the registry loads and are never mutated afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ────────────────────────────────────────────────────────────────────────────
// Category
// ────────────────────────────────────────────────────────────────────────────

/// Closed set of section categories a pattern can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    Hero,
    Features,
    Pricing,
    Testimonials,
    #[serde(alias = "cta")]
    CallToAction,
    Faq,
    Team,
    Stats,
    #[serde(alias = "logos")]
    LogoWall,
    Footer,
    #[serde(alias = "nav")]
    Navigation,
    Content,
    Commerce,
    Dashboard,
    Auth,
}

impl PatternCategory {
    pub const ALL: [PatternCategory; 15] = [
        PatternCategory::Hero,
        PatternCategory::Features,
        PatternCategory::Pricing,
        PatternCategory::Testimonials,
        PatternCategory::CallToAction,
        PatternCategory::Faq,
        PatternCategory::Team,
        PatternCategory::Stats,
        PatternCategory::LogoWall,
        PatternCategory::Footer,
        PatternCategory::Navigation,
        PatternCategory::Content,
        PatternCategory::Commerce,
        PatternCategory::Dashboard,
        PatternCategory::Auth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternCategory::Hero => "hero",
            PatternCategory::Features => "features",
            PatternCategory::Pricing => "pricing",
            PatternCategory::Testimonials => "testimonials",
            PatternCategory::CallToAction => "call-to-action",
            PatternCategory::Faq => "faq",
            PatternCategory::Team => "team",
            PatternCategory::Stats => "stats",
            PatternCategory::LogoWall => "logo-wall",
            PatternCategory::Footer => "footer",
            PatternCategory::Navigation => "navigation",
            PatternCategory::Content => "content",
            PatternCategory::Commerce => "commerce",
            PatternCategory::Dashboard => "dashboard",
            PatternCategory::Auth => "auth",
        }
    }
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown pattern category '{}'", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for PatternCategory {
    type Err = UnknownCategory;

    /// Accepts the canonical kebab-case names plus a few common spellings
    /// returned by the generative service ("cta", "logos", "nav", underscores).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        let category = match normalized.as_str() {
            "hero" => PatternCategory::Hero,
            "features" | "feature" => PatternCategory::Features,
            "pricing" => PatternCategory::Pricing,
            "testimonials" | "testimonial" => PatternCategory::Testimonials,
            "call-to-action" | "cta" => PatternCategory::CallToAction,
            "faq" | "faqs" => PatternCategory::Faq,
            "team" => PatternCategory::Team,
            "stats" | "statistics" => PatternCategory::Stats,
            "logo-wall" | "logos" => PatternCategory::LogoWall,
            "footer" => PatternCategory::Footer,
            "navigation" | "nav" | "navbar" => PatternCategory::Navigation,
            "content" => PatternCategory::Content,
            "commerce" | "ecommerce" => PatternCategory::Commerce,
            "dashboard" => PatternCategory::Dashboard,
            "auth" | "authentication" => PatternCategory::Auth,
            _ => return Err(UnknownCategory(s.to_string())),
        };
        Ok(category)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Slots
// ────────────────────────────────────────────────────────────────────────────

/// The kind of value a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// Single-line text: headlines, labels, button copy.
    Text,
    /// Multi-sentence copy, may contain light markdown.
    RichText,
    /// Image reference (URL or `{ "src": ... }` object).
    Image,
    Array,
    Boolean,
    Number,
}

impl SlotKind {
    /// Whether a JSON value has the JSON shape this kind expects.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            SlotKind::Text | SlotKind::RichText => value.is_string(),
            SlotKind::Image => {
                value.is_string()
                    || value
                        .as_object()
                        .map(|o| o.get("src").or_else(|| o.get("url")).is_some_and(Value::is_string))
                        .unwrap_or(false)
            }
            SlotKind::Array => value.is_array(),
            SlotKind::Boolean => value.is_boolean(),
            SlotKind::Number => value.is_number(),
        }
    }
}

/// A named, typed property a pattern exposes for population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub name: String,
    pub kind: SlotKind,
    #[serde(default)]
    pub required: bool,
    /// Character cap for text slots, item cap for array slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub default: Value,
    /// Aspect ratio hint for image slots, e.g. "16:9".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    /// Free-text hint passed to the generator for this slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_hint: Option<String>,
    /// Field schema for each element of an array slot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Slot>,
}

impl Slot {
    pub fn new(name: &str, kind: SlotKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            max_length: None,
            default: Value::Null,
            aspect_ratio: None,
            prompt_hint: None,
            items: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn with_items(mut self, items: Vec<Slot>) -> Self {
        self.items = items;
        self
    }

    /// True if this slot, or any field of its array items, holds an image.
    pub fn contains_images(&self) -> bool {
        self.kind == SlotKind::Image || self.items.iter().any(Slot::contains_images)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Patterns
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternVariant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Immutable catalog entry describing one reusable section structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub category: PatternCategory,
    /// Selection guidance: when this pattern is the right choice.
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub variants: Vec<PatternVariant>,
    pub slots: Vec<Slot>,
    /// Prompt template for filling this pattern's image slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
}

impl Pattern {
    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.name == name)
    }

    pub fn has_variant(&self, variant_id: &str) -> bool {
        self.variants.iter().any(|v| v.id == variant_id)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Number of tags shared with `other`, case-insensitive.
    pub fn shared_tag_count(&self, other: &Pattern) -> usize {
        self.tags.iter().filter(|t| other.has_tag(t)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_serde_is_kebab_case() {
        let json = serde_json::to_string(&PatternCategory::CallToAction).unwrap();
        assert_eq!(json, r#""call-to-action""#);
        let parsed: PatternCategory = serde_json::from_str(r#""logo-wall""#).unwrap();
        assert_eq!(parsed, PatternCategory::LogoWall);
    }

    #[test]
    fn test_category_accepts_cta_alias() {
        let parsed: PatternCategory = serde_json::from_str(r#""cta""#).unwrap();
        assert_eq!(parsed, PatternCategory::CallToAction);
    }

    #[test]
    fn test_category_from_str_normalizes_spelling() {
        assert_eq!("Logo_Wall".parse::<PatternCategory>(), Ok(PatternCategory::LogoWall));
        assert_eq!("navbar".parse::<PatternCategory>(), Ok(PatternCategory::Navigation));
        assert!("carousel".parse::<PatternCategory>().is_err());
    }

    #[test]
    fn test_category_display_round_trips_through_from_str() {
        for category in PatternCategory::ALL {
            assert_eq!(category.to_string().parse::<PatternCategory>(), Ok(category));
        }
    }

    #[test]
    fn test_image_kind_accepts_url_or_src_object() {
        assert!(SlotKind::Image.accepts(&json!("https://cdn.example.com/a.png")));
        assert!(SlotKind::Image.accepts(&json!({"src": "/a.png", "alt": "A"})));
        assert!(!SlotKind::Image.accepts(&json!({"alt": "A"})));
        assert!(!SlotKind::Image.accepts(&json!(3)));
    }

    #[test]
    fn test_slot_contains_nested_images() {
        let slot = Slot::new("features", SlotKind::Array).with_items(vec![
            Slot::new("title", SlotKind::Text),
            Slot::new("image", SlotKind::Image),
        ]);
        assert!(slot.contains_images());
        assert!(!Slot::new("title", SlotKind::Text).contains_images());
    }

    #[test]
    fn test_slot_defaults_when_fields_omitted() {
        let slot: Slot = serde_json::from_value(json!({"name": "title", "kind": "text"})).unwrap();
        assert!(!slot.required);
        assert!(slot.default.is_null());
        assert!(slot.items.is_empty());
    }
}
