pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::composition::handlers as composition;
use crate::patterns::handlers as patterns;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Pattern API (read-only catalog)
        .route("/api/v1/patterns", get(patterns::handle_list_patterns))
        .route("/api/v1/patterns/:id", get(patterns::handle_get_pattern))
        .route(
            "/api/v1/patterns/:id/similar",
            get(patterns::handle_similar_patterns),
        )
        // Composition API
        .route("/api/v1/compositions", post(composition::handle_compose))
        .route(
            "/api/v1/compositions/validate",
            post(composition::handle_validate),
        )
        .route(
            "/api/v1/compositions/images/estimate",
            post(composition::handle_estimate_images),
        )
        .route("/api/v1/sections/migrate", post(composition::handle_migrate))
        .route(
            "/api/v1/sections/images",
            post(composition::handle_section_images),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::composition::composer::ComposerSettings;
    use crate::composition::image_generator::ImageSettings;
    use crate::testing::{icon_grid_section, shared_registry, FakeImageService, ScriptedLlm};

    fn app() -> Router {
        build_router(AppState {
            registry: shared_registry(),
            llm: Arc::new(ScriptedLlm::unavailable()),
            images: Arc::new(FakeImageService::default()),
            settings: ComposerSettings {
                concurrency: 2,
                llm_timeout: Duration::from_secs(5),
                images: ImageSettings {
                    concurrency: 2,
                    batch_size: 2,
                    timeout: Duration::from_secs(5),
                },
            },
        })
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(request).await
    }

    async fn post_json(uri: &str, payload: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        send(request).await
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_patterns_by_category() {
        let (status, body) = get_json("/api/v1/patterns?category=features").await;
        assert_eq!(status, StatusCode::OK);
        let patterns = body["patterns"].as_array().unwrap();
        assert_eq!(body["total"], patterns.len());
        assert!(!patterns.is_empty());
        assert!(patterns.iter().all(|p| p["category"] == "features"));
    }

    #[tokio::test]
    async fn test_list_patterns_by_any_tag() {
        let (status, body) = get_json("/api/v1/patterns?category=hero&tag=cinematic,developer").await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<&str> = body["patterns"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["hero-split-image", "hero-video-bg"]);
    }

    #[tokio::test]
    async fn test_list_patterns_rejects_unknown_category() {
        let (status, body) = get_json("/api/v1/patterns?category=carousel").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_get_pattern_and_not_found() {
        let (status, body) = get_json("/api/v1/patterns/faq-accordion").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "faq-accordion");

        let (status, body) = get_json("/api/v1/patterns/does-not-exist").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_similar_patterns_respects_limit() {
        let (status, body) = get_json("/api/v1/patterns/features-icon-grid/similar?limit=1").await;
        assert_eq!(status, StatusCode::OK);
        let patterns = body["patterns"].as_array().unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0]["category"], "features");
        assert_ne!(patterns[0]["id"], "features-icon-grid");
    }

    #[tokio::test]
    async fn test_compose_degrades_when_model_is_down() {
        let payload = json!({
            "brand_name": "Forge",
            "vision": "Ship infrastructure without the yak shaving",
            "aesthetic": ["dark", "technical"],
            "pages": [{"page_type": "landing"}],
            "options": {"generate_images": false, "seed": 7}
        });
        let (status, body) = post_json("/api/v1/compositions", payload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pages"][0]["route"], "/");
        assert!(!body["pages"][0]["sections"].as_array().unwrap().is_empty());
        assert_eq!(body["metadata"]["seed"], 7);
        assert!(!body["metadata"]["warnings"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compose_rejects_request_without_pages() {
        let payload = json!({"brand_name": "Forge", "vision": "x", "pages": []});
        let (status, body) = post_json("/api/v1/compositions", payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_validate_section_for_export() {
        let payload = json!({"section": icon_grid_section(), "intent": "export"});
        let (status, body) = post_json("/api/v1/compositions/validate", payload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
        assert_eq!(body["ready_for_preview"], true);
        assert!(body["blocking"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate_unknown_pattern_blocks_preview() {
        let mut section = icon_grid_section();
        section.pattern_id = "retired-pattern".to_string();
        let (status, body) = post_json("/api/v1/compositions/validate", json!({"section": section})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["intent"], "preview");
        assert_eq!(body["ready"], false);
        assert_eq!(body["blocking"][0]["kind"], "unknown_pattern");
    }

    #[tokio::test]
    async fn test_validate_requires_exactly_one_target() {
        let (status, _) = post_json("/api/v1/compositions/validate", json!({"intent": "preview"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_estimate_counts_missing_images() {
        let hero = json!({
            "id": "6f1c1a0e-2b1f-4c53-9a5e-0a8d1f3b2c11",
            "pattern_id": "hero-split-image",
            "props": {"headline": "Hi", "image": {"src": "placeholder:hero/image", "alt": "hero"}}
        });
        let (status, body) = post_json(
            "/api/v1/compositions/images/estimate",
            json!({"sections": [hero, icon_grid_section()]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"], 1);
        assert_eq!(body["sections_with_images"], 1);
        assert_eq!(body["batches"], 1);
    }

    #[tokio::test]
    async fn test_migrate_section() {
        let payload = json!({"section": icon_grid_section(), "pattern_id": "features-alternating"});
        let (status, body) = post_json("/api/v1/sections/migrate", payload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["section"]["pattern_id"], "features-alternating");
        assert_eq!(body["section"]["props"]["title"], "Why teams switch");
    }

    #[tokio::test]
    async fn test_section_images_resolve_placeholders() {
        let hero = json!({
            "id": "0d7e4a52-93c1-4f0a-8b6f-2f4b9e1d7a30",
            "pattern_id": "hero-split-image",
            "props": {
                "headline": "Ship from your terminal",
                "image": {"src": "placeholder:hero/image", "alt": "Terminal window"}
            }
        });
        let payload = json!({"section": hero, "brand_name": "Forge", "aesthetic": ["dark"]});
        let (status, body) = post_json("/api/v1/sections/images", payload).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["section"]["props"]["image"]["src"], "https://img.test/1.png");
        assert_eq!(body["section"]["props"]["image"]["alt"], "Terminal window");
        assert_eq!(body["report"]["stats"]["generated"], 1);
        assert_eq!(body["report"]["outcomes"][0]["path"], "image");
    }

    #[tokio::test]
    async fn test_migrate_rejects_blank_target() {
        let payload = json!({"section": icon_grid_section(), "pattern_id": "  "});
        let (status, _) = post_json("/api/v1/sections/migrate", payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
