//! Chooses the registered pattern (and variant) that best serves a section.
//!
//! The decision is delegated to the generative service under a fixed response
//! shape; every id it returns is checked against the registry. Any failure
//! (transport, timeout, malformed payload, hallucinated id) drops into
//! `fallback_select`, a deterministic tag-overlap heuristic, so a decision is
//! always produced.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::composition::models::{RejectedAlternative, Stage};
use crate::composition::prompts::{SELECTOR_PROMPT_TEMPLATE, SELECTOR_RESPONSE_SHAPE, SELECTOR_SYSTEM};
use crate::composition::prop_generator::truncate_chars;
use crate::composition::request::{MatchingStrictness, PageIntent, SectionRequirement};
use crate::llm_client::{request_json, GenerationRequest, GenerativeService, LlmError};
use crate::patterns::models::Pattern;
use crate::patterns::registry::PatternRegistry;

/// Candidates shown to the model, highest heuristic score first.
const MAX_CANDIDATES: usize = 12;
const MAX_FIELD_CHARS: usize = 400;
const MAX_GUIDANCE_CHARS: usize = 200;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSelection {
    pub pattern_id: String,
    pub variant_id: Option<String>,
    pub rationale: String,
    pub rejected: Vec<RejectedAlternative>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Selected(PatternSelection),
    /// No registered pattern serves the requirement; the gap filler takes over.
    NoFit { reason: String },
}

/// Raw answer from the model. Every field is untrusted.
#[derive(Debug, Deserialize)]
struct SelectionResponse {
    #[serde(default)]
    pattern_id: Option<String>,
    #[serde(default)]
    variant_id: Option<String>,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    rejected: Vec<RejectedAlternative>,
    #[serde(default)]
    no_fit: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Selection
// ────────────────────────────────────────────────────────────────────────────

/// Selects a pattern for one section requirement.
pub async fn select_pattern(
    llm: &dyn GenerativeService,
    registry: &PatternRegistry,
    intent: &PageIntent,
    requirement: &SectionRequirement,
    strictness: MatchingStrictness,
    timeout: Duration,
) -> Stage<SelectionOutcome> {
    let ranked = rank_candidates(registry, intent, requirement);
    if ranked.is_empty() {
        return Stage::Fallback {
            value: SelectionOutcome::NoFit {
                reason: format!("no pattern registered for category {}", requirement.category),
            },
            reason: "empty candidate set".to_string(),
        };
    }

    let candidates: Vec<&Pattern> = ranked.iter().take(MAX_CANDIDATES).map(|(_, p)| *p).collect();
    let request = GenerationRequest::new(
        SELECTOR_SYSTEM,
        build_selector_prompt(intent, requirement, &candidates),
        SELECTOR_RESPONSE_SHAPE,
    );

    let response = request_json::<SelectionResponse>(llm, &request, timeout).await;
    resolve_selection(response, registry, &candidates, intent, requirement, strictness)
}

/// Turns the model's answer into a trusted outcome, or falls back.
fn resolve_selection(
    response: Result<SelectionResponse, LlmError>,
    registry: &PatternRegistry,
    candidates: &[&Pattern],
    intent: &PageIntent,
    requirement: &SectionRequirement,
    strictness: MatchingStrictness,
) -> Stage<SelectionOutcome> {
    let fallback = |reason: String| {
        warn!(
            category = %requirement.category,
            reason = %reason,
            "Pattern selection falling back to heuristic"
        );
        Stage::Fallback {
            value: fallback_select(registry, intent, requirement, strictness),
            reason,
        }
    };

    let response = match response {
        Ok(r) => r,
        Err(e) => return fallback(format!("generative service failed: {e}")),
    };

    let Some(pattern_id) = response.pattern_id.filter(|id| !id.trim().is_empty()) else {
        if response.no_fit {
            debug!(category = %requirement.category, "Model reported no fitting pattern");
            return Stage::Generated(SelectionOutcome::NoFit {
                reason: non_empty_or(response.rationale, "model reported no fitting pattern"),
            });
        }
        return fallback("response named no pattern".to_string());
    };

    let Some(pattern) = registry.get(&pattern_id) else {
        return fallback(format!("response referenced unknown pattern '{pattern_id}'"));
    };
    if !candidates.iter().any(|c| c.id == pattern.id) {
        return fallback(format!(
            "response picked '{pattern_id}', which is not a {} candidate",
            requirement.category
        ));
    }

    let rationale = response.rationale.trim().to_string();
    if rationale.is_empty() && strictness != MatchingStrictness::Loose {
        return fallback("response carried no rationale".to_string());
    }

    let variant_id = response.variant_id.filter(|v| {
        let known = pattern.has_variant(v);
        if !known {
            warn!(pattern_id = %pattern.id, variant = %v, "Dropping unknown variant from selection");
        }
        known
    });

    let rejected = response
        .rejected
        .into_iter()
        .filter(|r| r.pattern_id != pattern.id && registry.contains(&r.pattern_id))
        .collect();

    Stage::Generated(SelectionOutcome::Selected(PatternSelection {
        pattern_id: pattern.id.clone(),
        variant_id,
        rationale: non_empty_or(rationale, "chosen by model"),
        rejected,
    }))
}

/// Deterministic selection: same-category pattern with the highest tag overlap,
/// ties broken by id. No category match means "no fit"; under strict matching a
/// best candidate sharing zero tags is also "no fit".
pub fn fallback_select(
    registry: &PatternRegistry,
    intent: &PageIntent,
    requirement: &SectionRequirement,
    strictness: MatchingStrictness,
) -> SelectionOutcome {
    let ranked = rank_candidates(registry, intent, requirement);
    let Some(&(best_score, best)) = ranked.first() else {
        return SelectionOutcome::NoFit {
            reason: format!("no pattern registered for category {}", requirement.category),
        };
    };

    if strictness == MatchingStrictness::Strict && best_score == 0 {
        return SelectionOutcome::NoFit {
            reason: format!(
                "strict matching: no {} pattern shares a descriptor with the page",
                requirement.category
            ),
        };
    }

    let rejected = ranked
        .iter()
        .skip(1)
        .map(|(score, p)| RejectedAlternative {
            pattern_id: p.id.clone(),
            reason: format!("lower tag overlap ({score} vs {best_score})"),
        })
        .collect();

    SelectionOutcome::Selected(PatternSelection {
        pattern_id: best.id.clone(),
        variant_id: None,
        rationale: format!(
            "heuristic pick: highest tag overlap ({best_score}) among {} {} patterns",
            ranked.len(),
            requirement.category
        ),
        rejected,
    })
}

/// Same-category patterns scored by shared descriptors, best first, ties by id.
fn rank_candidates<'r>(
    registry: &'r PatternRegistry,
    intent: &PageIntent,
    requirement: &SectionRequirement,
) -> Vec<(usize, &'r Pattern)> {
    let mut descriptors: HashSet<String> = intent.descriptors().into_iter().collect();
    descriptors.extend(requirement.tags.iter().map(|t| t.to_lowercase()));

    let mut ranked: Vec<(usize, &Pattern)> = registry
        .by_category(requirement.category)
        .into_iter()
        .map(|p| {
            let score = p
                .tags
                .iter()
                .filter(|t| descriptors.contains(&t.to_lowercase()))
                .count();
            (score, p)
        })
        .collect();

    ranked.sort_by(|(a_score, a), (b_score, b)| b_score.cmp(a_score).then_with(|| a.id.cmp(&b.id)));
    ranked
}

fn build_selector_prompt(
    intent: &PageIntent,
    requirement: &SectionRequirement,
    candidates: &[&Pattern],
) -> String {
    let references = if intent.references.is_empty() {
        "none".to_string()
    } else {
        intent
            .references
            .iter()
            .map(|r| {
                format!(
                    "{} (aesthetic: {}, layout: {})",
                    r.url.as_deref().unwrap_or("unnamed"),
                    r.aesthetic.as_deref().unwrap_or("unknown"),
                    r.layout.as_deref().unwrap_or("unknown")
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    };

    let candidate_lines = candidates
        .iter()
        .map(|p| {
            let variants = if p.variants.is_empty() {
                "none".to_string()
            } else {
                p.variants.iter().map(|v| v.id.as_str()).collect::<Vec<_>>().join(", ")
            };
            format!(
                "- {} — {} — [{}] — variants: {}",
                p.id,
                truncate_chars(&p.description, MAX_GUIDANCE_CHARS),
                p.tags.join(", "),
                variants
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    SELECTOR_PROMPT_TEMPLATE
        .replace("{page_type}", intent.page_type.as_str())
        .replace("{brand_name}", &truncate_chars(&intent.brand_name, 80))
        .replace("{vision}", &truncate_chars(&intent.vision, MAX_FIELD_CHARS))
        .replace("{audience}", &truncate_chars(&intent.audience, MAX_FIELD_CHARS))
        .replace("{aesthetic}", &intent.aesthetic.join(", "))
        .replace("{references}", &references)
        .replace("{category}", requirement.category.as_str())
        .replace("{purpose}", &truncate_chars(&requirement.purpose, MAX_FIELD_CHARS))
        .replace("{candidates}", &candidate_lines)
}

fn non_empty_or(text: String, default: &str) -> String {
    if text.trim().is_empty() {
        default.to_string()
    } else {
        text
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::request::PageType;
    use crate::patterns::models::PatternCategory;
    use crate::testing::{builtin_registry, pattern, registry_of, ScriptedLlm};
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn dev_intent() -> PageIntent {
        PageIntent {
            page_type: PageType::Landing,
            brand_name: "Forge".to_string(),
            vision: "A CLI that ships infrastructure in minutes".to_string(),
            audience: "developers".to_string(),
            aesthetic: vec!["dark".to_string(), "technical".to_string()],
            references: vec![],
            features: vec![],
        }
    }

    fn hero_registry() -> PatternRegistry {
        registry_of(vec![
            pattern("hero-split-image", PatternCategory::Hero, &["technical", "image"]),
            pattern("hero-video-bg", PatternCategory::Hero, &["cinematic"]),
            pattern("footer-minimal", PatternCategory::Footer, &["minimal"]),
        ])
    }

    fn hero_requirement() -> SectionRequirement {
        SectionRequirement::new(PatternCategory::Hero, "Introduce the product")
    }

    fn selected_id(outcome: &SelectionOutcome) -> Option<&str> {
        match outcome {
            SelectionOutcome::Selected(s) => Some(s.pattern_id.as_str()),
            SelectionOutcome::NoFit { .. } => None,
        }
    }

    #[tokio::test]
    async fn test_service_unavailable_falls_back_to_tag_overlap() {
        let llm = ScriptedLlm::unavailable();
        let stage = select_pattern(
            &llm,
            &hero_registry(),
            &dev_intent(),
            &hero_requirement(),
            MatchingStrictness::Balanced,
            TIMEOUT,
        )
        .await;

        assert!(stage.is_fallback());
        assert_eq!(selected_id(stage.value()), Some("hero-split-image"));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_model_choice_is_accepted() {
        let llm = ScriptedLlm::new(vec![Ok(json!({
            "pattern_id": "hero-video-bg",
            "variant_id": null,
            "rationale": "The brand wants drama",
            "rejected": [{"pattern_id": "hero-split-image", "reason": "too plain"}],
            "no_fit": false
        })
        .to_string())]);

        let stage = select_pattern(
            &llm,
            &hero_registry(),
            &dev_intent(),
            &hero_requirement(),
            MatchingStrictness::Balanced,
            TIMEOUT,
        )
        .await;

        let SelectionOutcome::Selected(selection) = stage.value() else {
            panic!("expected a selection");
        };
        assert!(!stage.is_fallback());
        assert_eq!(selection.pattern_id, "hero-video-bg");
        assert_eq!(selection.rejected.len(), 1);
        assert!(llm.prompts()[0].contains("hero-split-image"));
    }

    #[tokio::test]
    async fn test_hallucinated_id_falls_back() {
        let llm = ScriptedLlm::new(vec![Ok(json!({
            "pattern_id": "hero-parallax-3d",
            "rationale": "Looks great"
        })
        .to_string())]);

        let stage = select_pattern(
            &llm,
            &hero_registry(),
            &dev_intent(),
            &hero_requirement(),
            MatchingStrictness::Balanced,
            TIMEOUT,
        )
        .await;

        assert!(stage.is_fallback());
        assert!(stage.fallback_reason().unwrap().contains("hero-parallax-3d"));
        assert_eq!(selected_id(stage.value()), Some("hero-split-image"));
    }

    #[tokio::test]
    async fn test_wrong_category_pick_falls_back() {
        let llm = ScriptedLlm::new(vec![Ok(json!({
            "pattern_id": "footer-minimal",
            "rationale": "Minimal is nice"
        })
        .to_string())]);

        let stage = select_pattern(
            &llm,
            &hero_registry(),
            &dev_intent(),
            &hero_requirement(),
            MatchingStrictness::Balanced,
            TIMEOUT,
        )
        .await;

        assert!(stage.is_fallback());
        assert_eq!(selected_id(stage.value()), Some("hero-split-image"));
    }

    #[tokio::test]
    async fn test_unknown_variant_is_dropped() {
        let registry = builtin_registry();
        let llm = ScriptedLlm::new(vec![Ok(json!({
            "pattern_id": "hero-split-image",
            "variant_id": "image-diagonal",
            "rationale": "Technical audience"
        })
        .to_string())]);

        let stage = select_pattern(
            &llm,
            &registry,
            &dev_intent(),
            &hero_requirement(),
            MatchingStrictness::Balanced,
            TIMEOUT,
        )
        .await;

        let SelectionOutcome::Selected(selection) = stage.into_value() else {
            panic!("expected a selection");
        };
        assert_eq!(selection.pattern_id, "hero-split-image");
        assert_eq!(selection.variant_id, None);
    }

    #[tokio::test]
    async fn test_missing_rationale_rejected_unless_loose() {
        let answer = json!({"pattern_id": "hero-video-bg"}).to_string();

        let balanced = select_pattern(
            &ScriptedLlm::new(vec![Ok(answer.clone())]),
            &hero_registry(),
            &dev_intent(),
            &hero_requirement(),
            MatchingStrictness::Balanced,
            TIMEOUT,
        )
        .await;
        assert!(balanced.is_fallback());

        let loose = select_pattern(
            &ScriptedLlm::new(vec![Ok(answer)]),
            &hero_registry(),
            &dev_intent(),
            &hero_requirement(),
            MatchingStrictness::Loose,
            TIMEOUT,
        )
        .await;
        assert!(!loose.is_fallback());
        assert_eq!(selected_id(loose.value()), Some("hero-video-bg"));
    }

    #[tokio::test]
    async fn test_model_no_fit_is_honoured() {
        let llm = ScriptedLlm::new(vec![Ok(json!({
            "pattern_id": null,
            "rationale": "Needs a timeline, none offered",
            "no_fit": true
        })
        .to_string())]);

        let stage = select_pattern(
            &llm,
            &hero_registry(),
            &dev_intent(),
            &hero_requirement(),
            MatchingStrictness::Balanced,
            TIMEOUT,
        )
        .await;

        assert!(!stage.is_fallback());
        assert!(matches!(stage.value(), SelectionOutcome::NoFit { .. }));
    }

    #[tokio::test]
    async fn test_empty_category_is_no_fit_without_calling_service() {
        let llm = ScriptedLlm::unavailable();
        let requirement = SectionRequirement::new(PatternCategory::Pricing, "Plans");
        let stage = select_pattern(
            &llm,
            &hero_registry(),
            &dev_intent(),
            &requirement,
            MatchingStrictness::Balanced,
            TIMEOUT,
        )
        .await;

        assert!(matches!(stage.value(), SelectionOutcome::NoFit { .. }));
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn test_fallback_ties_break_by_id() {
        let registry = registry_of(vec![
            pattern("hero-b", PatternCategory::Hero, &["technical"]),
            pattern("hero-a", PatternCategory::Hero, &["technical"]),
        ]);
        let outcome = fallback_select(
            &registry,
            &dev_intent(),
            &hero_requirement(),
            MatchingStrictness::Balanced,
        );
        assert_eq!(selected_id(&outcome), Some("hero-a"));
    }

    #[test]
    fn test_fallback_strict_requires_overlap() {
        let registry = registry_of(vec![pattern("hero-video-bg", PatternCategory::Hero, &["cinematic"])]);
        let strict = fallback_select(&registry, &dev_intent(), &hero_requirement(), MatchingStrictness::Strict);
        assert!(matches!(strict, SelectionOutcome::NoFit { .. }));

        let balanced =
            fallback_select(&registry, &dev_intent(), &hero_requirement(), MatchingStrictness::Balanced);
        assert_eq!(selected_id(&balanced), Some("hero-video-bg"));
    }

    #[test]
    fn test_requirement_tags_bias_the_fallback() {
        let mut requirement = hero_requirement();
        requirement.tags = vec!["Cinematic".to_string(), "media".to_string()];
        let mut intent = dev_intent();
        intent.aesthetic.clear();
        let outcome = fallback_select(&hero_registry(), &intent, &requirement, MatchingStrictness::Balanced);
        assert_eq!(selected_id(&outcome), Some("hero-video-bg"));
    }

    #[test]
    fn test_prompt_is_bounded() {
        let mut intent = dev_intent();
        intent.vision = "v".repeat(5_000);
        let registry = builtin_registry();
        let candidates: Vec<&Pattern> = registry.by_category(PatternCategory::Hero);
        let prompt = build_selector_prompt(&intent, &hero_requirement(), &candidates);
        assert!(prompt.len() < 5_000);
        assert!(prompt.contains("hero-centered"));
    }
}
