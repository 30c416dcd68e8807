//! Image Generator: resolves image placeholders through the image service.
//!
//! Tasks are collected from direct and array-nested image slots whose value is
//! empty or a placeholder, then run in batches under a concurrency ceiling.
//! Every task records its own outcome; a failure leaves the placeholder in place
//! and never stops the batch. Cancellation is checked between batches only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::composition::models::{
    is_image_placeholder, ImageStats, PageComposition, Props, SectionComposition,
};
use crate::composition::progress::CancelFlag;
use crate::composition::prompts::DEFAULT_IMAGE_PROMPT;
use crate::composition::request::PageIntent;
use crate::image_client::{ImageAsset, ImageError, ImageRequest, ImageService, ImageSize};
use crate::patterns::models::{Slot, SlotKind};
use crate::patterns::registry::PatternRegistry;

/// Item fields that describe what an array element is about, in preference order.
const SUBJECT_FIELDS: &[&str] = &["title", "name", "author", "label"];

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ImageSettings {
    pub concurrency: usize,
    pub batch_size: usize,
    pub timeout: Duration,
}

/// Context fields interpolated into image prompt templates.
#[derive(Debug, Clone)]
pub struct ImageContext {
    pub brand: String,
    pub audience: String,
    pub aesthetic: String,
    pub page: String,
}

impl ImageContext {
    pub fn from_intent(intent: &PageIntent) -> Self {
        Self {
            brand: intent.brand_name.clone(),
            audience: non_empty_or(&intent.audience, "a general audience"),
            aesthetic: non_empty_or(&intent.aesthetic.join(", "), "modern"),
            page: intent.page_type.as_str().to_string(),
        }
    }

    fn style(&self) -> String {
        self.aesthetic
            .split(',')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("modern")
            .to_string()
    }
}

/// Location of one image value inside a section's props.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageTarget {
    Slot { slot: String },
    Item { slot: String, index: usize, field: String },
}

impl ImageTarget {
    pub fn path(&self) -> String {
        match self {
            ImageTarget::Slot { slot } => slot.clone(),
            ImageTarget::Item { slot, index, field } => format!("{slot}[{index}].{field}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageTask {
    pub section_index: usize,
    pub target: ImageTarget,
    pub request: ImageRequest,
    /// Alt text kept alongside the generated reference.
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageResult {
    Generated { url: String, cached: bool },
    Failed { reason: String },
    /// Not attempted because the run was cancelled.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageOutcome {
    pub section_index: usize,
    pub path: String,
    pub result: ImageResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageReport {
    pub outcomes: Vec<ImageOutcome>,
    pub stats: ImageStats,
}

impl ImageReport {
    pub fn merge(&mut self, other: ImageReport) {
        self.stats.merge(&other.stats);
        self.outcomes.extend(other.outcomes);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageEstimate {
    pub images: usize,
    pub sections_with_images: usize,
    pub batches: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Task collection
// ────────────────────────────────────────────────────────────────────────────

/// Every image slot in `sections` that still needs a value.
pub fn collect_tasks(
    sections: &[SectionComposition],
    registry: &PatternRegistry,
    ctx: &ImageContext,
) -> Vec<ImageTask> {
    let mut tasks = Vec::new();
    for (section_index, section) in sections.iter().enumerate() {
        let Some(schema) = section_schema(section, registry) else {
            continue;
        };

        for slot in schema.slots.iter().filter(|s| s.contains_images()) {
            match slot.kind {
                SlotKind::Image => {
                    let value = section.props.get(&slot.name);
                    if value.map_or(true, is_image_placeholder) {
                        let subject = placeholder_alt(value)
                            .or_else(|| slot.prompt_hint.clone())
                            .unwrap_or_else(|| schema.name.clone());
                        tasks.push(build_task(
                            section_index,
                            ImageTarget::Slot { slot: slot.name.clone() },
                            slot,
                            subject,
                            schema.prompt_template,
                            ctx,
                        ));
                    }
                }
                SlotKind::Array => {
                    let Some(items) = section.props.get(&slot.name).and_then(Value::as_array) else {
                        continue;
                    };
                    for field in slot.items.iter().filter(|f| f.kind == SlotKind::Image) {
                        for (index, item) in items.iter().enumerate() {
                            let Some(fields) = item.as_object() else {
                                continue;
                            };
                            let value = fields.get(&field.name);
                            if !value.map_or(true, is_image_placeholder) {
                                continue;
                            }
                            let subject = placeholder_alt(value)
                                .or_else(|| item_subject(fields))
                                .or_else(|| field.prompt_hint.clone())
                                .unwrap_or_else(|| schema.name.clone());
                            tasks.push(build_task(
                                section_index,
                                ImageTarget::Item {
                                    slot: slot.name.clone(),
                                    index,
                                    field: field.name.clone(),
                                },
                                field,
                                subject,
                                schema.prompt_template,
                                ctx,
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
    }
    tasks
}

/// Counts image tasks without calling the image service.
pub fn estimate_images(
    sections: &[SectionComposition],
    registry: &PatternRegistry,
    batch_size: usize,
) -> ImageEstimate {
    let ctx = ImageContext {
        brand: String::new(),
        audience: String::new(),
        aesthetic: String::new(),
        page: String::new(),
    };
    let tasks = collect_tasks(sections, registry, &ctx);
    let mut sections_with_images: Vec<usize> = tasks.iter().map(|t| t.section_index).collect();
    sections_with_images.dedup();

    ImageEstimate {
        images: tasks.len(),
        sections_with_images: sections_with_images.len(),
        batches: tasks.len().div_ceil(batch_size.max(1)),
    }
}

struct SectionSchema<'a> {
    name: String,
    slots: &'a [Slot],
    prompt_template: Option<&'a str>,
}

fn section_schema<'a>(section: &'a SectionComposition, registry: &'a PatternRegistry) -> Option<SectionSchema<'a>> {
    if let Some(schema) = &section.custom_schema {
        return Some(SectionSchema {
            name: schema.name.clone(),
            slots: &schema.slots,
            prompt_template: None,
        });
    }
    registry.get(&section.pattern_id).map(|pattern| SectionSchema {
        name: pattern.name.clone(),
        slots: &pattern.slots,
        prompt_template: pattern.image_prompt.as_deref(),
    })
}

fn build_task(
    section_index: usize,
    target: ImageTarget,
    slot: &Slot,
    subject: String,
    template: Option<&str>,
    ctx: &ImageContext,
) -> ImageTask {
    let prompt = template
        .unwrap_or(DEFAULT_IMAGE_PROMPT)
        .replace("{subject}", &subject)
        .replace("{brand}", &ctx.brand)
        .replace("{audience}", &ctx.audience)
        .replace("{aesthetic}", &ctx.aesthetic)
        .replace("{page}", &ctx.page);

    ImageTask {
        section_index,
        target,
        request: ImageRequest {
            prompt,
            size: ImageSize::from_aspect_ratio(slot.aspect_ratio.as_deref()),
            style: ctx.style(),
        },
        alt: subject,
    }
}

fn placeholder_alt(value: Option<&Value>) -> Option<String> {
    value?
        .get("alt")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn item_subject(fields: &Map<String, Value>) -> Option<String> {
    SUBJECT_FIELDS
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Generation
// ────────────────────────────────────────────────────────────────────────────

/// Resolves image placeholders on every section of a page.
pub async fn generate_page_images(
    service: Arc<dyn ImageService>,
    mut page: PageComposition,
    registry: &PatternRegistry,
    ctx: &ImageContext,
    settings: ImageSettings,
    cancel: &CancelFlag,
) -> (PageComposition, ImageReport) {
    let report = fill_images(service, &mut page.sections, registry, ctx, settings, cancel).await;
    info!(
        page = %page.route,
        generated = report.stats.generated,
        failed = report.stats.failed,
        skipped = report.stats.skipped,
        "Page images resolved"
    );
    (page, report)
}

/// Resolves image placeholders on a single section.
pub async fn generate_section_images(
    service: Arc<dyn ImageService>,
    mut section: SectionComposition,
    registry: &PatternRegistry,
    ctx: &ImageContext,
    settings: ImageSettings,
    cancel: &CancelFlag,
) -> (SectionComposition, ImageReport) {
    let report = fill_images(
        service,
        std::slice::from_mut(&mut section),
        registry,
        ctx,
        settings,
        cancel,
    )
    .await;
    (section, report)
}

async fn fill_images(
    service: Arc<dyn ImageService>,
    sections: &mut [SectionComposition],
    registry: &PatternRegistry,
    ctx: &ImageContext,
    settings: ImageSettings,
    cancel: &CancelFlag,
) -> ImageReport {
    let tasks = collect_tasks(sections, registry, ctx);
    let mut report = ImageReport {
        stats: ImageStats {
            requested: tasks.len(),
            ..ImageStats::default()
        },
        ..ImageReport::default()
    };
    if tasks.is_empty() {
        return report;
    }

    let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let batch_size = settings.batch_size.max(1);

    for (batch_index, batch) in tasks.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            let remaining = &tasks[batch_index * batch_size..];
            warn!(skipped = remaining.len(), "Image generation cancelled");
            for task in remaining {
                report.stats.skipped += 1;
                report.outcomes.push(ImageOutcome {
                    section_index: task.section_index,
                    path: task.target.path(),
                    result: ImageResult::Skipped,
                });
            }
            break;
        }

        let mut results = run_batch(&service, &semaphore, batch, settings.timeout).await;
        debug!(batch = batch_index, size = batch.len(), "Image batch finished");

        for (offset, task) in batch.iter().enumerate() {
            let result = match results.remove(&offset) {
                Some(Ok(asset)) => {
                    if let Some(section) = sections.get_mut(task.section_index) {
                        apply_asset(&mut section.props, &task.target, &asset, &task.alt);
                    }
                    report.stats.generated += 1;
                    if asset.cached {
                        report.stats.cached += 1;
                    }
                    ImageResult::Generated {
                        url: asset.url,
                        cached: asset.cached,
                    }
                }
                Some(Err(e)) => {
                    warn!(path = %task.target.path(), error = %e, "Image generation failed");
                    report.stats.failed += 1;
                    ImageResult::Failed { reason: e.to_string() }
                }
                None => {
                    report.stats.failed += 1;
                    ImageResult::Failed {
                        reason: "image task did not complete".to_string(),
                    }
                }
            };
            report.outcomes.push(ImageOutcome {
                section_index: task.section_index,
                path: task.target.path(),
                result,
            });
        }
    }

    report
}

/// Runs one batch to completion. Results are keyed by position in the batch.
async fn run_batch(
    service: &Arc<dyn ImageService>,
    semaphore: &Arc<Semaphore>,
    batch: &[ImageTask],
    timeout: Duration,
) -> HashMap<usize, Result<ImageAsset, ImageError>> {
    let mut set = JoinSet::new();
    for (offset, task) in batch.iter().enumerate() {
        let service = Arc::clone(service);
        let semaphore = Arc::clone(semaphore);
        let request = task.request.clone();

        set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (offset, Err(ImageError::Malformed));
            };
            let result = match tokio::time::timeout(timeout, service.synthesize(&request)).await {
                Ok(result) => result,
                Err(_) => Err(ImageError::Timeout(timeout)),
            };
            (offset, result)
        });
    }

    let mut results = HashMap::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((offset, result)) => {
                results.insert(offset, result);
            }
            Err(e) => warn!(error = %e, "Image task panicked"),
        }
    }
    results
}

/// Writes the generated reference, keeping any alt text already present.
fn apply_asset(props: &mut Props, target: &ImageTarget, asset: &ImageAsset, alt: &str) {
    let slot_value = match target {
        ImageTarget::Slot { slot } => Some(props.entry(slot.clone()).or_insert(Value::Null)),
        ImageTarget::Item { slot, index, field } => props
            .get_mut(slot)
            .and_then(Value::as_array_mut)
            .and_then(|items| items.get_mut(*index))
            .and_then(Value::as_object_mut)
            .map(|fields| fields.entry(field.clone()).or_insert(Value::Null)),
    };
    let Some(slot_value) = slot_value else {
        return;
    };

    let mut resolved = Map::new();
    resolved.insert("src".to_string(), Value::String(asset.url.clone()));
    let existing_alt = slot_value.get("alt").and_then(Value::as_str).unwrap_or(alt).to_string();
    resolved.insert("alt".to_string(), Value::String(existing_alt));
    *slot_value = Value::Object(resolved);
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
