//! Drives a composition request through the full pipeline.
//!
//! Per section: Select → Generate props (or Gap Fill) → Validate. Sections of
//! every page run concurrently under one semaphore and are reassembled in plan
//! order. Images are resolved per page afterwards. Only an invalid request, an
//! unfillable gap with gap filling disabled, or cancellation end a run early.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::composition::blueprint::plan_sections;
use crate::composition::gap_filler::fill_gap;
use crate::composition::image_generator::{generate_page_images, ImageContext, ImageReport, ImageResult, ImageSettings};
use crate::composition::models::{
    CompositionMetadata, CompositionStats, DecisionSource, ModelInfo, PageComposition, PatternReasoning,
    ProjectComposition, RejectedAlternative, SectionComposition, Stage,
};
use crate::composition::progress::{CancelFlag, ProgressCallback, ProgressEvent, ProgressStage};
use crate::composition::prop_generator::{generate_props, truncate_chars};
use crate::composition::request::{CompositionRequest, MatchingStrictness, PageIntent, PageType, SectionRequirement};
use crate::composition::selector::{fallback_select, select_pattern, PatternSelection, SelectionOutcome};
use crate::composition::styles::derive_styles;
use crate::composition::validation::{validate_project, validate_section};
use crate::image_client::ImageService;
use crate::llm_client::GenerativeService;
use crate::patterns::models::PatternCategory;
use crate::patterns::registry::PatternRegistry;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("invalid composition request: {0}")]
    InvalidRequest(String),

    #[error("no pattern fits the {category} section on page {page} and gap filling is disabled")]
    NoFit { page: String, category: PatternCategory },

    #[error("composition cancelled")]
    Cancelled,

    #[error("section worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ComposerSettings {
    /// Default ceiling on concurrently composed sections.
    pub concurrency: usize,
    pub llm_timeout: Duration,
    pub images: ImageSettings,
}

pub struct Composer {
    registry: Arc<PatternRegistry>,
    llm: Arc<dyn GenerativeService>,
    images: Arc<dyn ImageService>,
    settings: ComposerSettings,
    progress: Option<ProgressCallback>,
}

// ────────────────────────────────────────────────────────────────────────────
// Per-section pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Everything a section worker needs, cheap to clone into a task.
#[derive(Clone)]
struct SectionContext {
    registry: Arc<PatternRegistry>,
    llm: Arc<dyn GenerativeService>,
    strictness: MatchingStrictness,
    gap_filling: bool,
    timeout: Duration,
}

/// How a section's pattern was decided.
struct Decision {
    pattern_id: String,
    variant_id: Option<String>,
    rationale: String,
    rejected: Vec<RejectedAlternative>,
    source: DecisionSource,
}

struct SectionDraft {
    section: SectionComposition,
    decision: Decision,
    warnings: Vec<String>,
    repairs: usize,
}

async fn compose_section(
    ctx: &SectionContext,
    route: &str,
    index: usize,
    intent: &PageIntent,
    requirement: &SectionRequirement,
) -> Result<SectionDraft, ComposeError> {
    let selection = select_pattern(
        ctx.llm.as_ref(),
        &ctx.registry,
        intent,
        requirement,
        ctx.strictness,
        ctx.timeout,
    )
    .await;

    let mut warnings = Vec::new();
    let (outcome, source) = match selection {
        Stage::Generated(outcome) => (outcome, DecisionSource::Model),
        Stage::Fallback { value, reason } => {
            warnings.push(format!("{route} section {index}: selection fell back ({reason})"));
            (value, DecisionSource::Fallback)
        }
    };

    let (selection, source) = match outcome {
        SelectionOutcome::Selected(selection) => (selection, source),
        SelectionOutcome::NoFit { reason } if ctx.gap_filling => {
            return gap_fill(ctx, route, index, intent, requirement, reason, warnings).await;
        }
        SelectionOutcome::NoFit { reason } => {
            // the heuristic may still find something the model declined
            match fallback_select(&ctx.registry, intent, requirement, ctx.strictness) {
                SelectionOutcome::Selected(selection) => {
                    warnings.push(format!(
                        "{route} section {index}: no fit reported ({reason}), using heuristic pick"
                    ));
                    (selection, DecisionSource::Fallback)
                }
                SelectionOutcome::NoFit { .. } => {
                    return Err(ComposeError::NoFit {
                        page: route.to_string(),
                        category: requirement.category,
                    })
                }
            }
        }
    };

    let PatternSelection {
        pattern_id,
        variant_id,
        rationale,
        rejected,
    } = selection;
    let Some(pattern) = ctx.registry.get(&pattern_id) else {
        return Err(ComposeError::Worker(format!("selected pattern '{pattern_id}' vanished")));
    };

    let props = generate_props(ctx.llm.as_ref(), pattern, intent, &requirement.purpose, ctx.timeout).await;
    if let Some(reason) = props.fallback_reason() {
        warnings.push(format!("{route} section {index}: default content used ({reason})"));
    }
    let generated = props.into_value();

    let mut section = SectionComposition::new(pattern.id.clone(), generated.props);
    section.variant_id = variant_id.clone();
    section.intent = Some(requirement.category);

    let validation = validate_section(&section, &ctx.registry);
    if !validation.ready_for_preview() {
        warn!(page = %route, section = index, pattern_id = %pattern.id, "Section is not preview-ready");
        warnings.extend(
            validation
                .issues
                .iter()
                .filter(|i| !i.kind.tolerated_in_preview())
                .map(|i| format!("{route} section {index}: {}", i.message)),
        );
    }

    Ok(SectionDraft {
        section,
        decision: Decision {
            pattern_id,
            variant_id,
            rationale,
            rejected,
            source,
        },
        warnings,
        repairs: generated.repairs.len(),
    })
}

async fn gap_fill(
    ctx: &SectionContext,
    route: &str,
    index: usize,
    intent: &PageIntent,
    requirement: &SectionRequirement,
    no_fit_reason: String,
    mut warnings: Vec<String>,
) -> Result<SectionDraft, ComposeError> {
    info!(page = %route, section = index, category = %requirement.category, "Gap filling section");
    let filled = fill_gap(ctx.llm.as_ref(), intent, requirement, ctx.timeout).await;
    if let Some(reason) = filled.fallback_reason() {
        warnings.push(format!("{route} section {index}: fallback custom section used ({reason})"));
    }
    let filled = filled.into_value();

    Ok(SectionDraft {
        decision: Decision {
            pattern_id: filled.section.pattern_id.clone(),
            variant_id: None,
            rationale: format!("custom section: {no_fit_reason}"),
            rejected: Vec::new(),
            source: DecisionSource::GapFill,
        },
        section: filled.section,
        warnings,
        repairs: filled.repairs.len(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Composer
// ────────────────────────────────────────────────────────────────────────────

/// A page resolved from the request: where it lives and what it contains.
struct PagePlan {
    route: String,
    title: String,
    description: String,
    layout: String,
    intent: Arc<PageIntent>,
    sections: Vec<SectionRequirement>,
}

impl Composer {
    pub fn new(
        registry: Arc<PatternRegistry>,
        llm: Arc<dyn GenerativeService>,
        images: Arc<dyn ImageService>,
        settings: ComposerSettings,
    ) -> Self {
        Self {
            registry,
            llm,
            images,
            settings,
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn emit(&self, stage: ProgressStage, page: Option<&str>, section: Option<usize>, completed: usize, total: usize) {
        if let Some(callback) = &self.progress {
            callback(ProgressEvent {
                stage,
                page: page.map(str::to_string),
                section,
                completed,
                total,
            });
        }
    }

    /// Runs the full pipeline for `request`.
    pub async fn compose(
        &self,
        request: &CompositionRequest,
        cancel: &CancelFlag,
    ) -> Result<ProjectComposition, ComposeError> {
        let plans = self.plan(request)?;
        let seed = request
            .options
            .seed
            .unwrap_or_else(|| Uuid::new_v4().as_u128() as u64);
        info!(
            brand = %request.brand_name,
            pages = plans.len(),
            seed,
            "Starting composition"
        );

        if cancel.is_cancelled() {
            return Err(ComposeError::Cancelled);
        }

        let styles = derive_styles(
            &request.aesthetic,
            &request.references,
            request.options.style_inheritance,
        );

        let drafts = self.compose_sections(request, &plans, cancel).await?;

        let mut stats = CompositionStats {
            pages: plans.len(),
            ..CompositionStats::default()
        };
        let mut warnings = Vec::new();
        let mut reasoning = Vec::new();
        let mut pages = Vec::with_capacity(plans.len());

        for (plan, page_drafts) in plans.iter().zip(drafts) {
            let mut sections = Vec::with_capacity(page_drafts.len());
            for (index, draft) in page_drafts.into_iter().enumerate() {
                stats.sections += 1;
                stats.repaired_props += draft.repairs;
                match draft.decision.source {
                    DecisionSource::Fallback => stats.fallback_selections += 1,
                    DecisionSource::GapFill => stats.gap_filled_sections += 1,
                    DecisionSource::Model => {}
                }
                reasoning.push(PatternReasoning {
                    page_route: plan.route.clone(),
                    section_index: index,
                    category: plan.sections[index].category,
                    chosen_pattern_id: draft.decision.pattern_id,
                    variant_id: draft.decision.variant_id,
                    rationale: draft.decision.rationale,
                    rejected: draft.decision.rejected,
                    source: draft.decision.source,
                });
                warnings.extend(draft.warnings);
                sections.push(draft.section);
            }
            pages.push(PageComposition {
                route: plan.route.clone(),
                title: plan.title.clone(),
                description: plan.description.clone(),
                layout: plan.layout.clone(),
                sections,
            });
        }

        if request.options.generate_images {
            let mut images = ImageReport::default();
            let total = pages.len();
            let mut resolved = Vec::with_capacity(total);
            for (index, (page, plan)) in pages.into_iter().zip(&plans).enumerate() {
                if cancel.is_cancelled() {
                    return Err(ComposeError::Cancelled);
                }
                let (page, report) = generate_page_images(
                    Arc::clone(&self.images),
                    page,
                    &self.registry,
                    &ImageContext::from_intent(&plan.intent),
                    self.settings.images,
                    cancel,
                )
                .await;
                for outcome in &report.outcomes {
                    if let ImageResult::Failed { reason } = &outcome.result {
                        warnings.push(format!(
                            "{} section {}: image {} unresolved ({reason})",
                            page.route, outcome.section_index, outcome.path
                        ));
                    }
                }
                images.merge(report);
                self.emit(ProgressStage::Images, Some(&page.route), None, index + 1, total);
                resolved.push(page);
            }
            stats.images = images.stats;
            pages = resolved;
        }

        if cancel.is_cancelled() {
            return Err(ComposeError::Cancelled);
        }

        let mut project = ProjectComposition {
            pages,
            styles,
            metadata: CompositionMetadata {
                generated_at: Utc::now(),
                seed,
                models: ModelInfo {
                    text_model: self.llm.model_id().to_string(),
                    image_model: self.images.model_id().to_string(),
                },
                reasoning,
                warnings,
                stats,
            },
        };

        let validation = validate_project(&project, &self.registry);
        self.emit(ProgressStage::Validating, None, None, 1, 1);
        for issue in &validation.issues {
            project
                .metadata
                .warnings
                .push(format!("validation ({:?}): {}", issue.kind, issue.message));
        }

        info!(
            sections = project.metadata.stats.sections,
            fallbacks = project.metadata.stats.fallback_selections,
            gap_filled = project.metadata.stats.gap_filled_sections,
            warnings = project.metadata.warnings.len(),
            "Composition complete"
        );
        self.emit(ProgressStage::Done, None, None, 1, 1);
        Ok(project)
    }

    /// Resolves routes, titles and section plans, rejecting malformed requests.
    fn plan(&self, request: &CompositionRequest) -> Result<Vec<PagePlan>, ComposeError> {
        let invalid = |msg: String| Err(ComposeError::InvalidRequest(msg));
        if request.brand_name.trim().is_empty() {
            return invalid("brand_name must not be empty".to_string());
        }
        if request.pages.is_empty() {
            return invalid("at least one page is required".to_string());
        }
        if request.options.max_patterns_per_page == 0 {
            return invalid("max_patterns_per_page must be at least 1".to_string());
        }
        if request.options.concurrency == Some(0) {
            return invalid("concurrency must be at least 1".to_string());
        }

        let mut routes = HashSet::new();
        let mut plans = Vec::with_capacity(request.pages.len());
        for (index, page) in request.pages.iter().enumerate() {
            let route = page
                .route
                .clone()
                .unwrap_or_else(|| page.page_type.default_route().to_string());
            if !route.starts_with('/') {
                return invalid(format!("route '{route}' must start with '/'"));
            }
            if !routes.insert(route.clone()) {
                return invalid(format!("route '{route}' is used by more than one page"));
            }
            if page.sections.as_ref().is_some_and(|s| s.is_empty()) {
                return invalid(format!("page '{route}' declares an empty section list"));
            }

            let sections = plan_sections(page, &request.features, request.options.max_patterns_per_page);
            self.emit(ProgressStage::Planning, Some(&route), None, index + 1, request.pages.len());
            plans.push(PagePlan {
                title: page
                    .title
                    .clone()
                    .unwrap_or_else(|| default_title(&request.brand_name, page.page_type)),
                description: page
                    .description
                    .clone()
                    .unwrap_or_else(|| truncate_chars(&request.vision, 160)),
                layout: page.page_type.layout_hint().to_string(),
                intent: Arc::new(PageIntent::from_request(request, page.page_type)),
                route,
                sections,
            });
        }
        Ok(plans)
    }

    /// Composes every planned section concurrently; results come back in plan order.
    async fn compose_sections(
        &self,
        request: &CompositionRequest,
        plans: &[PagePlan],
        cancel: &CancelFlag,
    ) -> Result<Vec<Vec<SectionDraft>>, ComposeError> {
        let ctx = SectionContext {
            registry: Arc::clone(&self.registry),
            llm: Arc::clone(&self.llm),
            strictness: request.options.strictness,
            gap_filling: request.options.gap_filling,
            timeout: self.settings.llm_timeout,
        };
        let concurrency = request.options.concurrency.unwrap_or(self.settings.concurrency).max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        // set on the first terminal error so queued sections stop early
        let halt = CancelFlag::new();

        let total: usize = plans.iter().map(|p| p.sections.len()).sum();
        let mut set = JoinSet::new();
        for (page_index, plan) in plans.iter().enumerate() {
            for (section_index, requirement) in plan.sections.iter().enumerate() {
                let ctx = ctx.clone();
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                let halt = halt.clone();
                let route = plan.route.clone();
                let intent = Arc::clone(&plan.intent);
                let requirement = requirement.clone();

                set.spawn(async move {
                    let result = match semaphore.acquire_owned().await {
                        Err(e) => Err(ComposeError::Worker(e.to_string())),
                        Ok(_permit) => {
                            if cancel.is_cancelled() || halt.is_cancelled() {
                                Err(ComposeError::Cancelled)
                            } else {
                                compose_section(&ctx, &route, section_index, &intent, &requirement).await
                            }
                        }
                    };
                    (page_index, section_index, result)
                });
            }
        }
        debug!(sections = total, concurrency, "Section workers spawned");
        self.emit(ProgressStage::Selecting, None, None, 0, total);

        let mut slots: Vec<Vec<Option<SectionDraft>>> = plans
            .iter()
            .map(|p| p.sections.iter().map(|_| None).collect())
            .collect();
        let mut first_error: Option<ComposeError> = None;
        let mut completed = 0;

        while let Some(joined) = set.join_next().await {
            let (page_index, section_index, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    halt.cancel();
                    if first_error.is_none() {
                        first_error = Some(ComposeError::Worker(e.to_string()));
                    }
                    continue;
                }
            };
            match result {
                Ok(draft) => {
                    completed += 1;
                    self.emit(
                        stage_for(draft.decision.source),
                        Some(&plans[page_index].route),
                        Some(section_index),
                        completed,
                        total,
                    );
                    slots[page_index][section_index] = Some(draft);
                }
                Err(e) => {
                    if !matches!(e, ComposeError::Cancelled) {
                        warn!(page = %plans[page_index].route, section = section_index, error = %e, "Section failed");
                    }
                    halt.cancel();
                    // a real failure outranks the cancellations it triggers
                    let replace = matches!(
                        (&first_error, &e),
                        (None, _) | (Some(ComposeError::Cancelled), ComposeError::NoFit { .. })
                    );
                    if replace {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(ComposeError::Cancelled);
        }

        slots
            .into_iter()
            .map(|page| {
                page.into_iter()
                    .map(|draft| draft.ok_or_else(|| ComposeError::Worker("section result missing".to_string())))
                    .collect()
            })
            .collect()
    }
}

fn stage_for(source: DecisionSource) -> ProgressStage {
    match source {
        DecisionSource::GapFill => ProgressStage::GapFilling,
        DecisionSource::Model | DecisionSource::Fallback => ProgressStage::Generating,
    }
}

fn default_title(brand: &str, page_type: PageType) -> String {
    match page_type {
        PageType::Landing => brand.to_string(),
        other => {
            let name = other.as_str();
            let mut chars = name.chars();
            let capitalized: String = chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect())
                .unwrap_or_default();
            format!("{capitalized} | {brand}")
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
