//! Axum route handlers for the read-only Pattern API.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::patterns::models::{Pattern, PatternCategory};
use crate::state::AppState;

const DEFAULT_SIMILAR_LIMIT: usize = 5;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PatternQuery {
    pub category: Option<String>,
    /// Comma-separated; a pattern matches if it carries any of them.
    pub tag: Option<String>,
    /// Free-text search over name, description and tags.
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PatternListResponse {
    pub patterns: Vec<Pattern>,
    pub total: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/patterns?category=&tag=&q=
///
/// Filters combine: a pattern must satisfy every filter given.
pub async fn handle_list_patterns(
    State(state): State<AppState>,
    Query(params): Query<PatternQuery>,
) -> Result<Json<PatternListResponse>, AppError> {
    let category = params
        .category
        .as_deref()
        .map(str::parse::<PatternCategory>)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let tags: Vec<String> = params
        .tag
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let query = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let candidates = match query {
        Some(q) => state.registry.search(q),
        None if !tags.is_empty() => state.registry.by_tags(&tags),
        None => state.registry.all().collect(),
    };

    let patterns: Vec<Pattern> = candidates
        .into_iter()
        .filter(|p| category.map_or(true, |c| p.category == c))
        .filter(|p| tags.is_empty() || tags.iter().any(|t| p.has_tag(t)))
        .cloned()
        .collect();

    Ok(Json(PatternListResponse {
        total: patterns.len(),
        patterns,
    }))
}

/// GET /api/v1/patterns/:id
pub async fn handle_get_pattern(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Pattern>, AppError> {
    state
        .registry
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Pattern '{id}' not found")))
}

/// GET /api/v1/patterns/:id/similar?limit=
///
/// Same-category alternatives ranked by shared tags.
pub async fn handle_similar_patterns(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SimilarQuery>,
) -> Result<Json<PatternListResponse>, AppError> {
    if !state.registry.contains(&id) {
        return Err(AppError::NotFound(format!("Pattern '{id}' not found")));
    }

    let limit = params.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);
    let patterns: Vec<Pattern> = state.registry.similar(&id, limit).into_iter().cloned().collect();

    Ok(Json(PatternListResponse {
        total: patterns.len(),
        patterns,
    }))
}
