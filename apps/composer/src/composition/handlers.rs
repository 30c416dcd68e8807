//! Axum route handlers for the Composition API.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::composition::image_generator::{
    estimate_images, generate_section_images, ImageContext, ImageEstimate, ImageReport,
};
use crate::composition::migration::{migrate, MigrationOutcome};
use crate::composition::models::{PageComposition, ProjectComposition, SectionComposition};
use crate::composition::progress::{CancelFlag, ProgressEvent};
use crate::composition::request::{CompositionRequest, PageIntent, PageType};
use crate::composition::validation::{
    validate_page, validate_project, validate_section, ReadinessIntent, ValidationIssue, ValidationResult,
};
use crate::errors::AppError;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// Exactly one of `project`, `page` or `section` must be present.
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub project: Option<ProjectComposition>,
    pub page: Option<PageComposition>,
    pub section: Option<SectionComposition>,
    /// Defaults to preview.
    pub intent: Option<ReadinessIntent>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub result: ValidationResult,
    pub intent: ReadinessIntent,
    pub ready: bool,
    pub ready_for_preview: bool,
    pub ready_for_export: bool,
    /// Issues that block `intent`.
    pub blocking: Vec<ValidationIssue>,
}

#[derive(Debug, Deserialize)]
pub struct EstimateRequest {
    #[serde(default)]
    pub pages: Vec<PageComposition>,
    /// Loose sections, estimated as one extra page.
    #[serde(default)]
    pub sections: Vec<SectionComposition>,
}

/// One section plus the brand context its image prompts are filled from.
#[derive(Debug, Deserialize)]
pub struct SectionImagesRequest {
    pub section: SectionComposition,
    pub brand_name: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub aesthetic: Vec<String>,
    pub page_type: Option<PageType>,
}

#[derive(Debug, Serialize)]
pub struct SectionImagesResponse {
    pub section: SectionComposition,
    pub report: ImageReport,
}

#[derive(Debug, Deserialize)]
pub struct MigrateRequest {
    pub section: SectionComposition,
    pub pattern_id: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/compositions
///
/// Full pipeline: plan → select → generate props → gap fill → validate → images.
/// Generative failures degrade to fallbacks and surface as metadata warnings.
pub async fn handle_compose(
    State(state): State<AppState>,
    Json(request): Json<CompositionRequest>,
) -> Result<Json<ProjectComposition>, AppError> {
    // Dropping this future on client disconnect aborts the section workers.
    let cancel = CancelFlag::new();
    let composer = state.composer().with_progress(Arc::new(|event: ProgressEvent| {
        debug!(
            stage = ?event.stage,
            page = event.page.as_deref().unwrap_or(""),
            completed = event.completed,
            total = event.total,
            "Composition progress"
        );
    }));

    let project = composer.compose(&request, &cancel).await?;

    info!(
        brand = %request.brand_name,
        pages = project.pages.len(),
        sections = project.metadata.stats.sections,
        warnings = project.metadata.warnings.len(),
        "Composition complete"
    );

    Ok(Json(project))
}

/// POST /api/v1/compositions/validate
pub async fn handle_validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, AppError> {
    let result = match (request.project, request.page, request.section) {
        (Some(project), None, None) => validate_project(&project, &state.registry),
        (None, Some(page), None) => validate_page(&page, &state.registry),
        (None, None, Some(section)) => validate_section(&section, &state.registry),
        _ => {
            return Err(AppError::Validation(
                "exactly one of project, page or section is required".to_string(),
            ))
        }
    };

    let intent = request.intent.unwrap_or(ReadinessIntent::Preview);
    let blocking = result.blocking(intent).into_iter().cloned().collect();

    Ok(Json(ValidateResponse {
        intent,
        ready: result.ready_for(intent),
        ready_for_preview: result.ready_for_preview(),
        ready_for_export: result.ready_for_export(),
        blocking,
        result,
    }))
}

/// POST /api/v1/compositions/images/estimate
///
/// Counts image tasks the way generation would, without calling the image service.
pub async fn handle_estimate_images(
    State(state): State<AppState>,
    Json(request): Json<EstimateRequest>,
) -> Result<Json<ImageEstimate>, AppError> {
    let batch_size = state.settings.images.batch_size;
    let mut groups: Vec<&[SectionComposition]> = request.pages.iter().map(|p| p.sections.as_slice()).collect();
    if !request.sections.is_empty() {
        groups.push(&request.sections);
    }

    let estimate = groups
        .into_iter()
        .map(|sections| estimate_images(sections, &state.registry, batch_size))
        .fold(ImageEstimate::default(), |mut total, page| {
            total.images += page.images;
            total.sections_with_images += page.sections_with_images;
            total.batches += page.batches;
            total
        });

    Ok(Json(estimate))
}

/// POST /api/v1/sections/images
///
/// Resolves the image placeholders of one section, e.g. after a migration.
/// Failed images keep their placeholder and are listed in the report.
pub async fn handle_section_images(
    State(state): State<AppState>,
    Json(request): Json<SectionImagesRequest>,
) -> Result<Json<SectionImagesResponse>, AppError> {
    if request.brand_name.trim().is_empty() {
        return Err(AppError::Validation("brand_name cannot be empty".to_string()));
    }

    let intent = PageIntent {
        page_type: request.page_type.unwrap_or(PageType::Landing),
        brand_name: request.brand_name,
        vision: String::new(),
        audience: request.audience,
        aesthetic: request.aesthetic,
        references: Vec::new(),
        features: Vec::new(),
    };
    let (section, report) = generate_section_images(
        Arc::clone(&state.images),
        request.section,
        &state.registry,
        &ImageContext::from_intent(&intent),
        state.settings.images,
        &CancelFlag::new(),
    )
    .await;

    Ok(Json(SectionImagesResponse { section, report }))
}

/// POST /api/v1/sections/migrate
pub async fn handle_migrate(
    State(state): State<AppState>,
    Json(request): Json<MigrateRequest>,
) -> Result<Json<MigrationOutcome>, AppError> {
    let pattern_id = request.pattern_id.trim();
    if pattern_id.is_empty() {
        return Err(AppError::Validation("pattern_id cannot be empty".to_string()));
    }

    let outcome = migrate(&request.section, pattern_id, &state.registry);
    if !outcome.warnings.is_empty() {
        debug!(
            from = %request.section.pattern_id,
            to = pattern_id,
            warnings = outcome.warnings.len(),
            "Migration produced warnings"
        );
    }

    Ok(Json(outcome))
}
