//! Gap Filler: synthesizes a bespoke section when no registered pattern fits.
//!
//! The model designs a small inline slot schema and fills it in one call. The
//! schema is checked with the same rules as registry definitions and the props
//! go through `sanitize_props`, so the result always passes preview
//! validation. If the model's design is unusable a fixed heading/body/image
//! schema is used instead.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::composition::models::{CustomSchema, SectionComposition, Stage, CUSTOM_PATTERN_PREFIX};
use crate::composition::prompts::{GAP_FILL_PROMPT_TEMPLATE, GAP_FILL_RESPONSE_SHAPE, GAP_FILL_SYSTEM};
use crate::composition::prop_generator::{sanitize_props, truncate_chars, FallbackContext, PropRepair};
use crate::composition::request::{PageIntent, SectionRequirement};
use crate::composition::validation::validate_slot_schema;
use crate::llm_client::prompts::COPY_INSTRUCTION;
use crate::llm_client::{request_json, GenerationRequest, GenerativeService};
use crate::patterns::models::{PatternCategory, Slot, SlotKind};

const MAX_SLOTS: usize = 8;
const MAX_SLUG_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct GapFill {
    pub section: SectionComposition,
    pub repairs: Vec<PropRepair>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GapFillResponse {
    name: String,
    description: String,
    layout: String,
    slots: Vec<Slot>,
    props: Map<String, Value>,
}

/// Produces a custom section for a requirement the registry cannot serve.
pub async fn fill_gap(
    llm: &dyn GenerativeService,
    intent: &PageIntent,
    requirement: &SectionRequirement,
    timeout: Duration,
) -> Stage<GapFill> {
    let request = GenerationRequest::new(
        GAP_FILL_SYSTEM,
        build_gap_prompt(intent, requirement),
        GAP_FILL_RESPONSE_SHAPE,
    );

    let response = match request_json::<GapFillResponse>(llm, &request, timeout).await {
        Ok(r) => r,
        Err(e) => {
            warn!(category = %requirement.category, error = %e, "Gap fill failed, using fallback schema");
            return Stage::Fallback {
                value: fallback_section(intent, requirement),
                reason: format!("generative service failed: {e}"),
            };
        }
    };

    if let Err(reason) = check_schema(&response.slots) {
        warn!(category = %requirement.category, reason = %reason, "Rejecting generated schema");
        return Stage::Fallback {
            value: fallback_section(intent, requirement),
            reason,
        };
    }

    let name = if response.name.trim().is_empty() {
        default_name(requirement.category)
    } else {
        truncate_chars(response.name.trim(), 80)
    };
    let schema = CustomSchema {
        name,
        category: requirement.category,
        description: truncate_chars(response.description.trim(), 240),
        layout: truncate_chars(response.layout.trim(), 240),
        slots: response.slots,
    };
    debug!(category = %requirement.category, name = %schema.name, "Synthesized custom section");

    Stage::Generated(build_section(schema, &response.props, intent, requirement))
}

/// Accepts a generated schema only if it would pass definition validation,
/// stays small, and nests at most one level.
fn check_schema(slots: &[Slot]) -> Result<(), String> {
    if slots.len() > MAX_SLOTS {
        return Err(format!("schema declares {} slots, limit is {MAX_SLOTS}", slots.len()));
    }
    if slots.iter().flat_map(|s| &s.items).any(|item| !item.items.is_empty()) {
        return Err("schema nests arrays more than one level deep".to_string());
    }
    match validate_slot_schema(slots).first() {
        Some(issue) => Err(format!("invalid schema: {}", issue.message)),
        None => Ok(()),
    }
}

fn build_section(
    schema: CustomSchema,
    raw_props: &Map<String, Value>,
    intent: &PageIntent,
    requirement: &SectionRequirement,
) -> GapFill {
    let pattern_id = custom_pattern_id(requirement.category, &schema.name);
    let ctx = FallbackContext {
        brand_name: &intent.brand_name,
        vision: &intent.vision,
        purpose: &requirement.purpose,
        image_key: &pattern_id,
    };
    let (props, repairs) = sanitize_props(&schema.slots, raw_props, &ctx);

    let mut section = SectionComposition::new(pattern_id, props);
    section.intent = Some(requirement.category);
    section.custom_schema = Some(schema);
    GapFill { section, repairs }
}

/// Deterministic heading/body/image section.
pub fn fallback_section(intent: &PageIntent, requirement: &SectionRequirement) -> GapFill {
    let mut image = Slot::new("image", SlotKind::Image);
    image.aspect_ratio = Some("16:9".to_string());

    let schema = CustomSchema {
        name: default_name(requirement.category),
        category: requirement.category,
        description: truncate_chars(&requirement.purpose, 240),
        layout: "stacked heading and body with an optional image".to_string(),
        slots: vec![
            Slot::new("heading", SlotKind::Text).required().max_length(80),
            Slot::new("body", SlotKind::RichText).required().max_length(600),
            image,
        ],
    };
    build_section(schema, &Map::new(), intent, requirement)
}

/// `custom:{category}-{slug}`, e.g. `custom:features-milestone-timeline`.
pub fn custom_pattern_id(category: PatternCategory, name: &str) -> String {
    let mut slug = String::new();
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = truncate_chars(slug.trim_end_matches('-'), MAX_SLUG_CHARS);
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "section" } else { slug };
    format!("{CUSTOM_PATTERN_PREFIX}{category}-{slug}")
}

fn default_name(category: PatternCategory) -> String {
    format!("Custom {} section", category.as_str().replace('-', " "))
}

fn build_gap_prompt(intent: &PageIntent, requirement: &SectionRequirement) -> String {
    let purpose = if requirement.purpose.trim().is_empty() {
        "(not specified)".to_string()
    } else {
        truncate_chars(&requirement.purpose, 400)
    };
    GAP_FILL_PROMPT_TEMPLATE
        .replace("{copy_instruction}", COPY_INSTRUCTION)
        .replace("{brand_name}", &intent.brand_name)
        .replace("{vision}", &truncate_chars(&intent.vision, 600))
        .replace("{audience}", &intent.audience)
        .replace("{aesthetic}", &intent.aesthetic.join(", "))
        .replace("{page_type}", intent.page_type.as_str())
        .replace("{category}", requirement.category.as_str())
        .replace("{purpose}", &purpose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::composition::request::PageType;
    use crate::composition::validation::validate_section;
    use crate::testing::{builtin_registry, ScriptedLlm};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn intent() -> PageIntent {
        PageIntent {
            page_type: PageType::About,
            brand_name: "Forge".to_string(),
            vision: "Ship infrastructure from your terminal".to_string(),
            audience: "developers".to_string(),
            aesthetic: vec!["dark".to_string()],
            references: vec![],
            features: vec![],
        }
    }

    fn requirement() -> SectionRequirement {
        SectionRequirement::new(PatternCategory::Content, "Company milestones since 2019")
    }

    fn timeline_answer() -> String {
        json!({
            "name": "Milestone Timeline",
            "description": "Vertical timeline of company milestones",
            "layout": "single column",
            "slots": [
                {"name": "heading", "kind": "text", "required": true, "max_length": 40},
                {"name": "milestones", "kind": "array", "required": true, "max_length": 3,
                 "items": [
                    {"name": "year", "kind": "text", "required": true, "max_length": 4},
                    {"name": "label", "kind": "text", "required": true, "max_length": 60}
                 ]}
            ],
            "props": {
                "heading": "Our journey so far, one year at a time, since the beginning",
                "milestones": [
                    {"year": "2019", "label": "Founded"},
                    {"year": "2021"},
                    {"year": "2022", "label": "Series A"},
                    {"year": "2024", "label": "1M deploys"}
                ]
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_generated_section_is_custom_and_preview_ready() {
        let llm = ScriptedLlm::new(vec![Ok(timeline_answer())]);
        let stage = fill_gap(&llm, &intent(), &requirement(), TIMEOUT).await;
        assert!(!stage.is_fallback());

        let section = stage.into_value().section;
        assert_eq!(section.pattern_id, "custom:content-milestone-timeline");
        assert!(section.is_custom());
        assert_eq!(section.intent, Some(PatternCategory::Content));

        let result = validate_section(&section, &builtin_registry());
        assert!(result.ready_for_preview(), "{:?}", result.issues);
        assert_eq!(section.props["milestones"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_service_failure_uses_fallback_schema() {
        let llm = ScriptedLlm::unavailable();
        let stage = fill_gap(&llm, &intent(), &requirement(), TIMEOUT).await;
        assert!(stage.is_fallback());

        let section = stage.into_value().section;
        let schema = section.custom_schema.as_ref().unwrap();
        let names: Vec<&str> = schema.slots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["heading", "body", "image"]);
        assert_eq!(section.props["heading"], json!("Company milestones since 2019"));
        assert!(validate_section(&section, &builtin_registry()).ready_for_preview());
    }

    #[tokio::test]
    async fn test_invalid_schema_is_rejected() {
        let answer = json!({
            "name": "Broken",
            "slots": [
                {"name": "title", "kind": "text"},
                {"name": "title", "kind": "number"}
            ],
            "props": {}
        });
        let llm = ScriptedLlm::new(vec![Ok(answer.to_string())]);
        let stage = fill_gap(&llm, &intent(), &requirement(), TIMEOUT).await;
        assert!(stage.fallback_reason().unwrap().contains("duplicate slot name"));
    }

    #[tokio::test]
    async fn test_array_default_outside_item_schema_is_rejected() {
        let answer = json!({
            "name": "Onboarding Steps",
            "slots": [
                {"name": "heading", "kind": "text", "required": true},
                {"name": "steps", "kind": "array", "required": true,
                 "items": [{"name": "label", "kind": "text", "required": true}],
                 "default": ["Sign up", "Deploy"]}
            ],
            "props": {"heading": "Get started"}
        });
        let llm = ScriptedLlm::new(vec![Ok(answer.to_string())]);
        let stage = fill_gap(&llm, &intent(), &requirement(), TIMEOUT).await;
        assert!(stage.fallback_reason().unwrap().contains("default items"));

        let section = stage.into_value().section;
        let result = validate_section(&section, &builtin_registry());
        assert!(result.ready_for_preview(), "{:?}", result.issues);
    }

    #[test]
    fn test_unusable_array_default_still_yields_preview_ready_section() {
        let slots = vec![
            Slot::new("heading", SlotKind::Text).required(),
            Slot::new("steps", SlotKind::Array)
                .required()
                .with_items(vec![Slot::new("label", SlotKind::Text).required()])
                .with_default(json!(["Sign up", "Deploy"])),
        ];
        let schema = CustomSchema {
            name: "Onboarding Steps".to_string(),
            category: PatternCategory::Content,
            description: String::new(),
            layout: String::new(),
            slots,
        };
        let fill = build_section(schema, &Map::new(), &intent(), &requirement());

        let steps = fill.section.props["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 1);
        assert!(!steps[0]["label"].as_str().unwrap().is_empty());
        let result = validate_section(&fill.section, &builtin_registry());
        assert!(result.ready_for_preview(), "{:?}", result.issues);
    }

    #[tokio::test]
    async fn test_empty_schema_is_rejected() {
        let llm = ScriptedLlm::new(vec![Ok(json!({"name": "Nothing"}).to_string())]);
        let stage = fill_gap(&llm, &intent(), &requirement(), TIMEOUT).await;
        assert!(stage.is_fallback());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let slots = vec![Slot::new("outer", SlotKind::Array).with_items(vec![
            Slot::new("inner", SlotKind::Array).with_items(vec![Slot::new("leaf", SlotKind::Text)]),
        ])];
        assert!(check_schema(&slots).is_err());
    }

    #[test]
    fn test_custom_pattern_id_slug() {
        assert_eq!(
            custom_pattern_id(PatternCategory::Features, "  Milestone Timeline!! "),
            "custom:features-milestone-timeline"
        );
        assert_eq!(custom_pattern_id(PatternCategory::CallToAction, "???"), "custom:call-to-action-section");
    }
}
