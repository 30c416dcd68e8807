//! Pattern Migration: re-attaches a section's content to a different pattern.
//!
//! Values move in three passes over the target slots: verbatim name matches,
//! then the shared alias table, then category rules for hero media and feature
//! arrays. Whatever cannot be placed is reported as a warning; migration never
//! fails.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::composition::models::{is_empty_value, Props, SectionComposition};
use crate::patterns::models::{Pattern, PatternCategory, Slot, SlotKind};
use crate::patterns::registry::PatternRegistry;

/// Slot names treated as interchangeable. Earlier names win when several are present.
const ALIAS_GROUPS: &[&[&str]] = &[
    &["title", "headline", "heading"],
    &["subtitle", "subheadline", "description", "tagline"],
    &["items", "features", "cards", "tiles"],
    &["body", "content", "text"],
    &["cta_text", "button_text", "primary_cta_text"],
    &["cta_link", "button_link", "href"],
    &["image", "background_image", "hero_image", "media"],
    &["video_url", "video", "background_video"],
    &["testimonials", "quotes", "reviews"],
    &["members", "team", "people"],
    &["logos", "companies", "customers"],
    &["stats", "metrics", "numbers"],
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    pub section: SectionComposition,
    pub warnings: Vec<String>,
}

/// Moves `section` onto `new_pattern_id`.
///
/// An unknown target id swaps only the id (and clears the variant) and reports a warning.
pub fn migrate(
    section: &SectionComposition,
    new_pattern_id: &str,
    registry: &PatternRegistry,
) -> MigrationOutcome {
    let mut migrated = section.clone();
    migrated.pattern_id = new_pattern_id.to_string();
    migrated.variant_id = None;

    let Some(target) = registry.get(new_pattern_id) else {
        warn!(
            from = %section.pattern_id,
            to = %new_pattern_id,
            "Migration target is not registered, swapping id only"
        );
        return MigrationOutcome {
            section: migrated,
            warnings: vec![format!(
                "pattern '{new_pattern_id}' is not registered; properties were kept unchanged"
            )],
        };
    };

    let source_slots = source_slots(section, registry);
    let source_category = source_category(section, registry);
    let mut warnings = Vec::new();

    let mut props = defaults(&target.slots);
    let mut consumed: HashSet<String> = HashSet::new();
    let mut filled: HashSet<&str> = HashSet::new();

    // verbatim
    for slot in &target.slots {
        if let Some(value) = usable(&section.props, &slot.name, slot) {
            props.insert(slot.name.clone(), adapt(slot, value));
            consumed.insert(slot.name.clone());
            filled.insert(&slot.name);
        }
    }

    // aliases
    let pending: Vec<&Slot> = target
        .slots
        .iter()
        .filter(|s| !filled.contains(s.name.as_str()))
        .collect();
    for slot in pending {
        let found = aliases_of(&slot.name)
            .into_iter()
            .filter(|alias| !consumed.contains(*alias) && !target_declares(target, alias))
            .find_map(|alias| usable(&section.props, alias, slot).map(|v| (alias, v)));
        if let Some((alias, value)) = found {
            debug!(from = %alias, to = %slot.name, "Migrating property through alias");
            props.insert(slot.name.clone(), adapt(slot, value));
            consumed.insert(alias.to_string());
            filled.insert(&slot.name);
        }
    }

    // category rules
    if source_category == Some(target.category) {
        let rule_kinds: &[SlotKind] = match target.category {
            PatternCategory::Hero => &[SlotKind::Image],
            PatternCategory::Features => &[SlotKind::Array],
            _ => &[],
        };
        let pending: Vec<&Slot> = target
            .slots
            .iter()
            .filter(|s| rule_kinds.contains(&s.kind) && !filled.contains(s.name.as_str()))
            .collect();
        for slot in pending {
            let found = source_slots
                .iter()
                .filter(|s| s.kind == slot.kind && !consumed.contains(&s.name))
                .find_map(|s| usable(&section.props, &s.name, slot).map(|v| (s.name.clone(), v)));
            if let Some((name, value)) = found {
                props.insert(slot.name.clone(), adapt(slot, value));
                consumed.insert(name);
                filled.insert(&slot.name);
            }
        }
    }

    for (key, value) in &section.props {
        if !consumed.contains(key) && !is_empty_value(value) {
            warnings.push(format!("property '{key}' has no counterpart in '{}' and was dropped", target.id));
        }
    }
    for slot in &target.slots {
        match props.get(&slot.name) {
            Some(value) if !is_empty_value(value) => {
                if let (Some(max), Some(text)) = (slot.max_length, value.as_str()) {
                    if text.chars().count() > max {
                        warnings.push(format!("'{}' exceeds max_length {max} for '{}'", slot.name, target.id));
                    }
                }
            }
            _ if slot.required => {
                warnings.push(format!("required slot '{}' has no value after migration", slot.name))
            }
            _ => {}
        }
    }

    debug!(
        from = %section.pattern_id,
        to = %target.id,
        warnings = warnings.len(),
        "Migrated section"
    );

    migrated.props = props;
    migrated.custom_schema = None;
    if migrated.intent.is_some() {
        migrated.intent = Some(target.category);
    }
    MigrationOutcome {
        section: migrated,
        warnings,
    }
}

fn defaults(slots: &[Slot]) -> Props {
    slots
        .iter()
        .filter(|s| !s.default.is_null())
        .map(|s| (s.name.clone(), s.default.clone()))
        .collect()
}

/// The source value under `key`, if non-empty and of a kind `slot` accepts.
fn usable<'a>(props: &'a Props, key: &str, slot: &Slot) -> Option<&'a Value> {
    props
        .get(key)
        .filter(|v| !is_empty_value(v) && slot.kind.accepts(v))
}

/// Array items are re-keyed to the target item schema; everything else is copied.
fn adapt(slot: &Slot, value: &Value) -> Value {
    match value {
        Value::Array(items) if !slot.items.is_empty() => {
            Value::Array(items.iter().map(|item| remap_item(&slot.items, item)).collect())
        }
        other => other.clone(),
    }
}

/// Adds aliased keys the target item schema expects. Existing keys are kept.
fn remap_item(item_slots: &[Slot], item: &Value) -> Value {
    let Some(fields) = item.as_object() else {
        return item.clone();
    };
    let mut remapped: Map<String, Value> = fields.clone();
    for slot in item_slots {
        if fields.contains_key(&slot.name) {
            continue;
        }
        let found = aliases_of(&slot.name)
            .into_iter()
            .filter(|alias| item_slots.iter().all(|s| s.name != **alias))
            .find_map(|alias| usable(fields, alias, slot).map(|v| (alias, v.clone())));
        if let Some((alias, value)) = found {
            remapped.remove(alias);
            remapped.insert(slot.name.clone(), value);
        }
    }
    Value::Object(remapped)
}

fn aliases_of(name: &str) -> Vec<&'static str> {
    ALIAS_GROUPS
        .iter()
        .filter(|group| group.contains(&name))
        .flat_map(|group| group.iter().copied())
        .filter(|alias| *alias != name)
        .collect()
}

fn target_declares(target: &Pattern, name: &str) -> bool {
    target.slot(name).is_some()
}

fn source_slots(section: &SectionComposition, registry: &PatternRegistry) -> Vec<Slot> {
    if let Some(schema) = &section.custom_schema {
        return schema.slots.clone();
    }
    registry
        .get(&section.pattern_id)
        .map(|p| p.slots.clone())
        .unwrap_or_default()
}

fn source_category(section: &SectionComposition, registry: &PatternRegistry) -> Option<PatternCategory> {
    match &section.custom_schema {
        Some(schema) => Some(schema.category),
        None => registry
            .get(&section.pattern_id)
            .map(|p| p.category)
            .or(section.intent),
    }
}
