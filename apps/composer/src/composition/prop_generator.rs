//! Fills every slot of a chosen pattern with concrete content.
//!
//! All slots of one pattern are requested in a single batched call. The answer
//! is never trusted as-is: `sanitize_props` rebuilds the property bag slot by
//! slot, repairing missing required values with the slot default (or a
//! context-derived fallback), coercing near-miss kinds and truncating over-long
//! text. The gap filler runs its inline schemas through the same function.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::composition::models::{
    is_image_placeholder, Props, Stage, IMAGE_PLACEHOLDER_PREFIX,
};
use crate::composition::prompts::{PROPS_PROMPT_TEMPLATE, PROPS_SYSTEM};
use crate::composition::request::PageIntent;
use crate::llm_client::prompts::COPY_INSTRUCTION;
use crate::llm_client::{request_json, GenerationRequest, GenerativeService};
use crate::patterns::models::{Pattern, Slot, SlotKind};

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairKind {
    /// A required value was missing and replaced by the default or a fallback.
    DefaultApplied,
    Truncated,
    /// A value of the wrong JSON type was converted, e.g. `"3"` → `3`.
    Coerced,
    /// An array held more items than its max_length.
    ItemsCapped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropRepair {
    pub slot: String,
    pub kind: RepairKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedProps {
    pub props: Props,
    pub repairs: Vec<PropRepair>,
}

/// Context used to synthesize fallback copy when neither the model nor the slot default helps.
#[derive(Debug, Clone)]
pub struct FallbackContext<'a> {
    pub brand_name: &'a str,
    pub vision: &'a str,
    pub purpose: &'a str,
    /// Prefix for image placeholders, usually the pattern id.
    pub image_key: &'a str,
}

// ────────────────────────────────────────────────────────────────────────────
// Generation
// ────────────────────────────────────────────────────────────────────────────

/// Generates content for every slot of `pattern` in one request.
pub async fn generate_props(
    llm: &dyn GenerativeService,
    pattern: &Pattern,
    intent: &PageIntent,
    purpose: &str,
    timeout: Duration,
) -> Stage<GeneratedProps> {
    let ctx = FallbackContext {
        brand_name: &intent.brand_name,
        vision: &intent.vision,
        purpose,
        image_key: &pattern.id,
    };

    let request = GenerationRequest::new(
        PROPS_SYSTEM,
        build_props_prompt(pattern, intent, purpose),
        &response_shape(&pattern.slots),
    );

    match request_json::<Map<String, Value>>(llm, &request, timeout).await {
        Ok(raw) => {
            let (props, repairs) = sanitize_props(&pattern.slots, &raw, &ctx);
            if !repairs.is_empty() {
                debug!(
                    pattern_id = %pattern.id,
                    repairs = repairs.len(),
                    "Repaired generated props"
                );
            }
            Stage::Generated(GeneratedProps { props, repairs })
        }
        Err(e) => {
            warn!(pattern_id = %pattern.id, error = %e, "Prop generation failed, using defaults");
            let (props, repairs) = sanitize_props(&pattern.slots, &Map::new(), &ctx);
            Stage::Fallback {
                value: GeneratedProps { props, repairs },
                reason: format!("generative service failed: {e}"),
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sanitization
// ────────────────────────────────────────────────────────────────────────────

/// Rebuilds a property bag from untrusted input so that every required slot is
/// non-empty and no text exceeds its max length. Keys not declared by `slots`
/// are dropped.
pub fn sanitize_props(
    slots: &[Slot],
    raw: &Map<String, Value>,
    ctx: &FallbackContext<'_>,
) -> (Props, Vec<PropRepair>) {
    let mut repairs = Vec::new();
    let props = sanitize_object(slots, raw, ctx, "", &mut repairs);
    (props, repairs)
}

fn sanitize_object(
    slots: &[Slot],
    raw: &Map<String, Value>,
    ctx: &FallbackContext<'_>,
    prefix: &str,
    repairs: &mut Vec<PropRepair>,
) -> Props {
    let mut props = Props::new();
    for slot in slots {
        let path = format!("{prefix}{}", slot.name);
        if let Some(value) = sanitize_slot(slot, raw.get(&slot.name), ctx, &path, repairs) {
            props.insert(slot.name.clone(), value);
        }
    }
    props
}

fn sanitize_slot(
    slot: &Slot,
    raw: Option<&Value>,
    ctx: &FallbackContext<'_>,
    path: &str,
    repairs: &mut Vec<PropRepair>,
) -> Option<Value> {
    match slot.kind {
        SlotKind::Image => Some(sanitize_image(raw, ctx, path)),

        SlotKind::Text | SlotKind::RichText => {
            let text = match raw {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(v @ (Value::Number(_) | Value::Bool(_))) => {
                    note(repairs, path, RepairKind::Coerced);
                    Some(v.to_string())
                }
                _ => None,
            };

            let text = match text {
                Some(t) => t,
                None if slot.required => {
                    note(repairs, path, RepairKind::DefaultApplied);
                    match slot.default.as_str().filter(|d| !d.trim().is_empty()) {
                        Some(d) => d.to_string(),
                        None => fallback_text(&slot.name, ctx),
                    }
                }
                None => return slot.default.as_str().map(|d| Value::String(d.to_string())),
            };

            match slot.max_length {
                Some(max) if text.chars().count() > max => {
                    note(repairs, path, RepairKind::Truncated);
                    Some(Value::String(truncate_chars(&text, max)))
                }
                _ => Some(Value::String(text)),
            }
        }

        SlotKind::Number => match raw {
            Some(v @ Value::Number(_)) => Some(v.clone()),
            Some(Value::String(s)) if s.trim().parse::<f64>().is_ok() => {
                note(repairs, path, RepairKind::Coerced);
                let n: f64 = s.trim().parse().unwrap_or_default();
                Some(number_value(n))
            }
            _ if slot.default.is_number() => Some(slot.default.clone()),
            _ if slot.required => {
                note(repairs, path, RepairKind::DefaultApplied);
                Some(json!(0))
            }
            _ => None,
        },

        SlotKind::Boolean => match raw {
            Some(v @ Value::Bool(_)) => Some(v.clone()),
            Some(Value::String(s)) if matches!(s.trim(), "true" | "false") => {
                note(repairs, path, RepairKind::Coerced);
                Some(Value::Bool(s.trim() == "true"))
            }
            _ if slot.default.is_boolean() => Some(slot.default.clone()),
            _ if slot.required => {
                note(repairs, path, RepairKind::DefaultApplied);
                Some(Value::Bool(false))
            }
            _ => None,
        },

        SlotKind::Array => {
            let mut items: Vec<Value> = match raw {
                Some(Value::Array(items)) => items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| sanitize_item(slot, item, ctx, &format!("{path}[{i}]."), repairs))
                    .collect(),
                _ => Vec::new(),
            };

            if items.is_empty() {
                // Default items go through the same cleanup; any that don't fit are dropped.
                let defaults: Vec<Value> = slot
                    .default
                    .as_array()
                    .map(|d| {
                        d.iter()
                            .filter_map(|item| sanitize_item(slot, item, ctx, &format!("{path}[]."), &mut Vec::new()))
                            .collect()
                    })
                    .unwrap_or_default();

                if !defaults.is_empty() {
                    if slot.required {
                        note(repairs, path, RepairKind::DefaultApplied);
                    }
                    items = defaults;
                } else if slot.required {
                    note(repairs, path, RepairKind::DefaultApplied);
                    items = vec![fallback_item(slot, ctx, path)];
                } else if raw.is_none() && !slot.default.is_array() {
                    return None;
                }
            }

            if let Some(max) = slot.max_length {
                if items.len() > max {
                    note(repairs, path, RepairKind::ItemsCapped);
                    items.truncate(max);
                }
            }
            Some(Value::Array(items))
        }
    }
}

fn note(repairs: &mut Vec<PropRepair>, path: &str, kind: RepairKind) {
    repairs.push(PropRepair {
        slot: path.to_string(),
        kind,
    });
}

/// Sanitizes one array element against the slot's item schema. Schema-less
/// arrays keep non-null elements unchanged.
fn sanitize_item(
    slot: &Slot,
    item: &Value,
    ctx: &FallbackContext<'_>,
    prefix: &str,
    repairs: &mut Vec<PropRepair>,
) -> Option<Value> {
    if slot.items.is_empty() {
        return (!item.is_null()).then(|| item.clone());
    }
    let fields = item.as_object()?;
    Some(Value::Object(sanitize_object(&slot.items, fields, ctx, prefix, repairs)))
}

fn fallback_item(slot: &Slot, ctx: &FallbackContext<'_>, path: &str) -> Value {
    if slot.items.is_empty() {
        return Value::String(humanize(&slot.name));
    }
    Value::Object(sanitize_object(
        &slot.items,
        &Map::new(),
        ctx,
        &format!("{path}[0]."),
        &mut Vec::new(),
    ))
}

/// Keeps real image references; everything else becomes a placeholder whose
/// `alt` carries the model's description of the image, when it gave one.
fn sanitize_image(raw: Option<&Value>, ctx: &FallbackContext<'_>, path: &str) -> Value {
    if let Some(value) = raw {
        if SlotKind::Image.accepts(value) && !is_image_placeholder(value) && is_resolvable(value) {
            return value.clone();
        }
    }

    let description = match raw {
        Some(Value::String(s)) if !s.trim().is_empty() && !is_resolvable(&Value::String(s.clone())) => {
            Some(s.trim())
        }
        Some(Value::Object(o)) => o.get("alt").and_then(Value::as_str),
        _ => None,
    };

    let mut placeholder = Map::new();
    placeholder.insert(
        "src".to_string(),
        Value::String(format!("{IMAGE_PLACEHOLDER_PREFIX}{}/{path}", ctx.image_key)),
    );
    placeholder.insert(
        "alt".to_string(),
        Value::String(truncate_chars(description.unwrap_or(ctx.purpose), 200)),
    );
    Value::Object(placeholder)
}

fn is_resolvable(value: &Value) -> bool {
    let src = match value {
        Value::String(s) => s.as_str(),
        Value::Object(o) => o.get("src").or_else(|| o.get("url")).and_then(Value::as_str).unwrap_or(""),
        _ => "",
    };
    src.starts_with("https://") || src.starts_with("http://") || src.starts_with('/')
}

/// Copy for a required text slot that has neither a model value nor a default.
fn fallback_text(slot_name: &str, ctx: &FallbackContext<'_>) -> String {
    let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
    let name = slot_name.to_lowercase();

    let text = match name.as_str() {
        "logo_text" | "brand" | "company" | "author" => non_empty(ctx.brand_name),
        "title" | "headline" | "heading" | "name" => non_empty(ctx.purpose).or_else(|| non_empty(ctx.brand_name)),
        "subtitle" | "subheadline" | "description" | "tagline" | "body" | "quote" | "answer" => {
            non_empty(ctx.vision)
        }
        n if n.ends_with("cta_text") || n.ends_with("button_text") || n == "submit_text" => {
            Some("Get started".to_string())
        }
        n if n.ends_with("link") || n.ends_with("href") || n.ends_with("url") => Some("#".to_string()),
        _ => None,
    };

    text.unwrap_or_else(|| humanize(slot_name))
}

/// "cta_text" → "Cta text".
fn humanize(name: &str) -> String {
    let spaced = name.replace(['_', '-'], " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Untitled".to_string(),
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// Truncates to at most `max` characters, preferring a word boundary when one
/// falls in the last 40% of the budget.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    let cut: String = text.chars().take(max).collect();
    let min_keep = max * 3 / 5;
    match cut.rfind(char::is_whitespace) {
        Some(idx) if cut[..idx].chars().count() >= min_keep => cut[..idx].trim_end().to_string(),
        _ => cut.trim_end().to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Prompt building
// ────────────────────────────────────────────────────────────────────────────

fn build_props_prompt(pattern: &Pattern, intent: &PageIntent, purpose: &str) -> String {
    PROPS_PROMPT_TEMPLATE
        .replace("{copy_instruction}", COPY_INSTRUCTION)
        .replace("{brand_name}", &intent.brand_name)
        .replace("{vision}", &truncate_chars(&intent.vision, 600))
        .replace("{audience}", &intent.audience)
        .replace("{aesthetic}", &intent.aesthetic.join(", "))
        .replace("{page_type}", intent.page_type.as_str())
        .replace("{pattern_name}", &pattern.name)
        .replace("{pattern_description}", &pattern.description)
        .replace("{purpose}", purpose)
        .replace("{slots}", &describe_slots(&pattern.slots, ""))
}

fn describe_slots(slots: &[Slot], indent: &str) -> String {
    slots
        .iter()
        .map(|slot| {
            let kind = serde_json::to_value(slot.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let mut line = format!(
                "{indent}- {} — {} — {}",
                slot.name,
                kind,
                if slot.required { "required" } else { "optional" }
            );
            if let Some(max) = slot.max_length {
                let unit = if slot.kind == SlotKind::Array { "items" } else { "chars" };
                line.push_str(&format!(" — max {max} {unit}"));
            }
            if let Some(hint) = &slot.prompt_hint {
                line.push_str(&format!(" — {hint}"));
            }
            if !slot.items.is_empty() {
                line.push_str(" — each item:\n");
                line.push_str(&describe_slots(&slot.items, &format!("{indent}    ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Example JSON object with one key per slot, used as the required response shape.
fn response_shape(slots: &[Slot]) -> String {
    fn example(slot: &Slot) -> Value {
        match slot.kind {
            SlotKind::Text | SlotKind::RichText => json!("..."),
            SlotKind::Image => json!("description of the ideal image"),
            SlotKind::Boolean => json!(false),
            SlotKind::Number => json!(0),
            SlotKind::Array if slot.items.is_empty() => json!(["..."]),
            SlotKind::Array => {
                let item: Map<String, Value> =
                    slot.items.iter().map(|s| (s.name.clone(), example(s))).collect();
                json!([item])
            }
        }
    }

    let shape: Map<String, Value> = slots.iter().map(|s| (s.name.clone(), example(s))).collect();
    serde_json::to_string_pretty(&Value::Object(shape)).unwrap_or_else(|_| "{}".to_string())
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
