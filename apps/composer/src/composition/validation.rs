//! Structural checks for pattern definitions, sections, pages and projects.
//!
//! Every check returns a `ValidationResult` listing structured issues; nothing here
//! mutates or auto-corrects a composition. Two readiness predicates sit on top:
//! preview tolerates unresolved imagery, export tolerates nothing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::composition::models::{
    is_empty_value, is_image_placeholder, PageComposition, ProjectComposition, SectionComposition,
    CUSTOM_PATTERN_PREFIX,
};
use crate::patterns::models::{Pattern, PatternCategory, Slot, SlotKind};
use crate::patterns::registry::PatternRegistry;

// ────────────────────────────────────────────────────────────────────────────
// Result types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingRequiredSlot,
    WrongKind,
    MaxLengthExceeded,
    UnknownPattern,
    CategoryMismatch,
    UnknownVariant,
    /// Required image slot with no value at all.
    MissingImage,
    /// Image slot still holding a placeholder.
    UnresolvedPlaceholder,
    InvalidDefinition,
    DuplicateSectionId,
    DuplicateRoute,
    InvalidRoute,
    EmptyPage,
}

impl IssueKind {
    /// Issues a preview renderer can live with.
    pub fn tolerated_in_preview(&self) -> bool {
        matches!(
            self,
            IssueKind::MissingImage
                | IssueKind::UnresolvedPlaceholder
                | IssueKind::UnknownVariant
                | IssueKind::EmptyPage
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<Uuid>,
    /// Slot path, e.g. `features[1].image`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessIntent {
    Preview,
    Export,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
        }
    }

    pub fn ready_for_preview(&self) -> bool {
        self.issues.iter().all(|i| i.kind.tolerated_in_preview())
    }

    /// Strict: no issues at all, unresolved placeholders included.
    pub fn ready_for_export(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn ready_for(&self, intent: ReadinessIntent) -> bool {
        match intent {
            ReadinessIntent::Preview => self.ready_for_preview(),
            ReadinessIntent::Export => self.ready_for_export(),
        }
    }

    /// Issues that block the given intent.
    pub fn blocking(&self, intent: ReadinessIntent) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| intent == ReadinessIntent::Export || !i.kind.tolerated_in_preview())
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Definitions
// ────────────────────────────────────────────────────────────────────────────

/// Checks a pattern definition: required fields, unique slot names, sane slot schemas.
pub fn validate_definition(pattern: &Pattern) -> ValidationResult {
    let mut issues = Vec::new();

    if pattern.id.trim().is_empty() {
        issues.push(definition_issue("pattern id is empty", None));
    } else if pattern.id.starts_with(CUSTOM_PATTERN_PREFIX) {
        issues.push(definition_issue(
            &format!("pattern id '{}' uses the reserved '{CUSTOM_PATTERN_PREFIX}' prefix", pattern.id),
            None,
        ));
    }
    if pattern.name.trim().is_empty() {
        issues.push(definition_issue("pattern name is empty", None));
    }
    if pattern.description.trim().is_empty() {
        issues.push(definition_issue("pattern description is empty", None));
    }

    let mut variant_ids = HashSet::new();
    for variant in &pattern.variants {
        if variant.id.trim().is_empty() || !variant_ids.insert(variant.id.as_str()) {
            issues.push(definition_issue(
                &format!("variant id '{}' is empty or duplicated", variant.id),
                None,
            ));
        }
    }

    issues.extend(validate_slot_schema(&pattern.slots));
    ValidationResult::from_issues(issues)
}

/// Slot-schema rules shared by registry patterns and gap-filled inline schemas.
pub fn validate_slot_schema(slots: &[Slot]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if slots.is_empty() {
        issues.push(definition_issue("schema declares no slots", None));
    }
    check_slot_list(slots, "", &mut issues);
    issues
}

fn check_slot_list(slots: &[Slot], prefix: &str, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for slot in slots {
        let path = format!("{prefix}{}", slot.name);

        if slot.name.trim().is_empty() {
            issues.push(definition_issue("slot name is empty", Some(path.clone())));
            continue;
        }
        if !seen.insert(slot.name.as_str()) {
            issues.push(definition_issue(
                &format!("duplicate slot name '{}'", slot.name),
                Some(path.clone()),
            ));
        }
        if slot.max_length == Some(0) {
            issues.push(definition_issue("max_length must be positive", Some(path.clone())));
        }
        if !slot.items.is_empty() && slot.kind != SlotKind::Array {
            issues.push(definition_issue(
                "only array slots may declare item fields",
                Some(path.clone()),
            ));
        }
        if !slot.default.is_null() {
            if !slot.kind.accepts(&slot.default) {
                issues.push(definition_issue(
                    &format!("default value does not match kind {:?}", slot.kind),
                    Some(path.clone()),
                ));
            } else if let (Some(max), Some(text)) = (slot.max_length, slot.default.as_str()) {
                if text.chars().count() > max {
                    issues.push(definition_issue(
                        &format!("default value exceeds max_length {max}"),
                        Some(path.clone()),
                    ));
                }
            } else if let Some(defaults) = slot.default.as_array().filter(|_| !slot.items.is_empty()) {
                if !defaults.iter().all(|item| item_fits(&slot.items, item)) {
                    issues.push(definition_issue(
                        "default items do not match the item fields",
                        Some(path.clone()),
                    ));
                }
            }
        }
        if !slot.items.is_empty() {
            check_slot_list(&slot.items, &format!("{path}[]."), issues);
        }
    }
}

/// An array element fits when it is an object whose declared fields hold values of the right kind.
fn item_fits(fields: &[Slot], item: &Value) -> bool {
    let Some(object) = item.as_object() else {
        return false;
    };
    fields.iter().all(|field| match object.get(&field.name) {
        None | Some(Value::Null) => true,
        Some(value) => field.kind.accepts(value),
    })
}

fn definition_issue(message: &str, slot: Option<String>) -> ValidationIssue {
    ValidationIssue {
        kind: IssueKind::InvalidDefinition,
        message: message.to_string(),
        section_id: None,
        slot,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sections, pages, projects
// ────────────────────────────────────────────────────────────────────────────

/// Validates one section against its registry pattern (or its inline schema when gap-filled).
pub fn validate_section(section: &SectionComposition, registry: &PatternRegistry) -> ValidationResult {
    let mut issues = Vec::new();
    let issue = |kind: IssueKind, message: String, slot: Option<String>| ValidationIssue {
        kind,
        message,
        section_id: Some(section.id),
        slot,
    };

    let (slots, category): (&[Slot], Option<PatternCategory>) = if section.is_custom() {
        match &section.custom_schema {
            Some(schema) => {
                for mut definition in validate_slot_schema(&schema.slots) {
                    definition.section_id = Some(section.id);
                    issues.push(definition);
                }
                (&schema.slots, Some(schema.category))
            }
            None => {
                issues.push(issue(
                    IssueKind::InvalidDefinition,
                    format!("custom section '{}' carries no inline schema", section.pattern_id),
                    None,
                ));
                return ValidationResult::from_issues(issues);
            }
        }
    } else {
        match registry.get(&section.pattern_id) {
            Some(pattern) => {
                if let Some(variant) = &section.variant_id {
                    if !pattern.has_variant(variant) {
                        issues.push(issue(
                            IssueKind::UnknownVariant,
                            format!("variant '{variant}' is not defined by '{}'", pattern.id),
                            None,
                        ));
                    }
                }
                (&pattern.slots, Some(pattern.category))
            }
            None => {
                issues.push(issue(
                    IssueKind::UnknownPattern,
                    format!("pattern '{}' is not registered", section.pattern_id),
                    None,
                ));
                return ValidationResult::from_issues(issues);
            }
        }
    };

    if let (Some(intent), Some(actual)) = (section.intent, category) {
        if intent != actual {
            issues.push(issue(
                IssueKind::CategoryMismatch,
                format!("section planned as {intent} but pattern is {actual}"),
                None,
            ));
        }
    }

    let mut slot_issues = Vec::new();
    check_values(slots, &section.props, "", &mut slot_issues);
    issues.extend(
        slot_issues
            .into_iter()
            .map(|(kind, message, path)| issue(kind, message, Some(path))),
    );

    ValidationResult::from_issues(issues)
}

fn check_values(
    slots: &[Slot],
    props: &serde_json::Map<String, Value>,
    prefix: &str,
    out: &mut Vec<(IssueKind, String, String)>,
) {
    for slot in slots {
        let path = format!("{prefix}{}", slot.name);
        let value = props.get(&slot.name);

        if slot.kind == SlotKind::Image {
            match value {
                None | Some(Value::Null) if slot.required => out.push((
                    IssueKind::MissingImage,
                    "required image has no value".to_string(),
                    path,
                )),
                None | Some(Value::Null) => {}
                Some(v) if !slot.kind.accepts(v) => out.push((
                    IssueKind::WrongKind,
                    "expected an image reference".to_string(),
                    path,
                )),
                Some(v) if is_image_placeholder(v) => out.push((
                    IssueKind::UnresolvedPlaceholder,
                    "image placeholder has not been generated".to_string(),
                    path,
                )),
                Some(_) => {}
            }
            continue;
        }

        let Some(value) = value.filter(|v| !is_empty_value(v)) else {
            if slot.required {
                out.push((
                    IssueKind::MissingRequiredSlot,
                    format!("required slot '{}' is missing or empty", slot.name),
                    path,
                ));
            }
            continue;
        };

        if !slot.kind.accepts(value) {
            out.push((
                IssueKind::WrongKind,
                format!("expected {:?}, found {}", slot.kind, json_type(value)),
                path,
            ));
            continue;
        }

        match (slot.kind, value) {
            (SlotKind::Text | SlotKind::RichText, Value::String(text)) => {
                if let Some(max) = slot.max_length {
                    let len = text.chars().count();
                    if len > max {
                        out.push((
                            IssueKind::MaxLengthExceeded,
                            format!("{len} characters exceeds max_length {max}"),
                            path,
                        ));
                    }
                }
            }
            (SlotKind::Array, Value::Array(items)) => {
                if let Some(max) = slot.max_length {
                    if items.len() > max {
                        out.push((
                            IssueKind::MaxLengthExceeded,
                            format!("{} items exceeds max_length {max}", items.len()),
                            path.clone(),
                        ));
                    }
                }
                if !slot.items.is_empty() {
                    for (index, item) in items.iter().enumerate() {
                        let item_path = format!("{path}[{index}].");
                        match item.as_object() {
                            Some(fields) => check_values(&slot.items, fields, &item_path, out),
                            None => out.push((
                                IssueKind::WrongKind,
                                format!("expected an object, found {}", json_type(item)),
                                format!("{path}[{index}]"),
                            )),
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn validate_page(page: &PageComposition, registry: &PatternRegistry) -> ValidationResult {
    let mut issues = Vec::new();

    if !page.route.starts_with('/') {
        issues.push(ValidationIssue {
            kind: IssueKind::InvalidRoute,
            message: format!("route '{}' must start with '/'", page.route),
            section_id: None,
            slot: None,
        });
    }
    if page.sections.is_empty() {
        issues.push(ValidationIssue {
            kind: IssueKind::EmptyPage,
            message: format!("page '{}' has no sections", page.route),
            section_id: None,
            slot: None,
        });
    }

    let mut seen = HashSet::new();
    for section in &page.sections {
        if !seen.insert(section.id) {
            issues.push(ValidationIssue {
                kind: IssueKind::DuplicateSectionId,
                message: format!("section id {} appears more than once", section.id),
                section_id: Some(section.id),
                slot: None,
            });
        }
        issues.extend(validate_section(section, registry).issues);
    }

    ValidationResult::from_issues(issues)
}

pub fn validate_project(project: &ProjectComposition, registry: &PatternRegistry) -> ValidationResult {
    let mut issues = Vec::new();
    let mut routes = HashSet::new();

    for page in &project.pages {
        if !routes.insert(page.route.as_str()) {
            issues.push(ValidationIssue {
                kind: IssueKind::DuplicateRoute,
                message: format!("route '{}' is used by more than one page", page.route),
                section_id: None,
                slot: None,
            });
        }
        issues.extend(validate_page(page, registry).issues);
    }

    ValidationResult::from_issues(issues)
}
