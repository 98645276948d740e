use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use onsam_manager::RoadmManager;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

pub fn build_app(
    manager: Arc<RoadmManager>,
    auth_token: Arc<String>,
    check_credentials: bool,
) -> Router {
    let state = AppState { manager, auth_token, check_credentials };

    Router::new()
        // Health
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        // Advertisement
        .route("/resources", get(handlers::list_resources))
        // Slice lifecycle
        .route("/reserve", post(handlers::reserve))
        .route("/slices/:slice_urn", get(handlers::describe_slice))
        .route("/slices/renew", post(handlers::renew))
        .route("/slices/action", post(handlers::operational_action))
        .route("/slices/delete", post(handlers::delete_slices))
        // Auth middleware applies to all routes above
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use onsam_client::ControllerClient;
    use onsam_store::RoadmStore;
    use std::time::Duration;
    use tower::util::ServiceExt;

    const TEST_TOKEN: &str = "test-token";

    async fn test_app(check_credentials: bool) -> (tempfile::TempDir, Router, RoadmStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RoadmStore::connect(dir.path()).await.unwrap();
        // No controller behind this address; the routes under test never
        // reach the device queue.
        let client = Arc::new(
            ControllerClient::new(
                "http://127.0.0.1:9/opennaas/",
                "admin",
                "123456",
                Duration::from_secs(1),
            )
            .unwrap(),
        );
        let manager = Arc::new(RoadmManager::new(store.clone(), client, 60));
        let app = build_app(manager, Arc::new(TEST_TOKEN.to_string()), check_credentials);
        (dir, app, store)
    }

    async fn seed_device(store: &RoadmStore) {
        let mut session = store.session().await.unwrap();
        session
            .audit_resources(&[("roadm".into(), "roadmA".into())])
            .await
            .unwrap();
        let mut roadms = Vec::new();
        for ep in ["ep1", "ep2"] {
            for label in ["l1", "l2"] {
                roadms.push(("roadm".into(), "roadmA".into(), ep.into(), label.into()));
            }
        }
        session.audit_roadms(&roadms).await.unwrap();
        session.audit_terminated().await.unwrap();
        session.commit().await.unwrap();
    }

    fn reserve_body() -> String {
        serde_json::json!({
            "slice_urn": "s1",
            "resources": [{
                "name": "roadmA",
                "type": "roadm",
                "in_endpoint": "ep1",
                "in_label": "l1",
                "out_endpoint": "ep2",
                "out_label": "l2",
            }],
            "client": { "name": "alice", "id": "urn:alice", "email": "alice@example.net" },
        })
        .to_string()
    }

    async fn post_json(app: &Router, uri: &str, body: String) -> axum::response::Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn health_returns_200() {
        let (_dir, app, _store) = test_app(false).await;
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn credential_check_rejects_missing_token() {
        let (_dir, app, _store) = test_app(true).await;
        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("Authorization", format!("Bearer {}", TEST_TOKEN))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn credential_check_rejects_wrong_token() {
        let (_dir, app, _store) = test_app(true).await;
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("Authorization", "Bearer wrong-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn resources_lists_seeded_inventory() {
        let (_dir, app, store) = test_app(false).await;
        seed_device(&store).await;

        let resp = app
            .oneshot(Request::builder().uri("/resources").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn reserve_then_describe_round_trips() {
        let (_dir, app, store) = test_app(false).await;
        seed_device(&store).await;

        let resp = post_json(&app, "/reserve", reserve_body()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(Request::builder().uri("/slices/s1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let manifest = body.as_array().unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest[0]["urn"], "roadmA:ep1:l1");
        assert_eq!(manifest[0]["details"]["connected_out_urn"], "roadmA:ep2:l2");
    }

    #[tokio::test]
    async fn double_reserve_maps_to_conflict() {
        let (_dir, app, store) = test_app(false).await;
        seed_device(&store).await;

        let resp = post_json(&app, "/reserve", reserve_body()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = post_json(&app, "/reserve", reserve_body()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_slice_maps_to_search_failed() {
        let (_dir, app, _store) = test_app(false).await;
        let resp = app
            .oneshot(Request::builder().uri("/slices/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unsupported_action_is_bad_request() {
        let (_dir, app, _store) = test_app(false).await;
        let body = serde_json::json!({ "slices": ["s1"], "action": "geni_restart" }).to_string();
        let resp = post_json(&app, "/slices/action", body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn strict_renew_maps_to_general_error() {
        let (_dir, app, _store) = test_app(false).await;
        let body = serde_json::json!({
            "slices": { "s1": { "name": "alice", "id": "urn:alice", "email": "" } },
            "end_time": chrono::Utc::now() + chrono::Duration::minutes(5),
            "best_effort": false,
        })
        .to_string();
        let resp = post_json(&app, "/slices/renew", body).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn best_effort_renew_succeeds() {
        let (_dir, app, store) = test_app(false).await;
        seed_device(&store).await;
        post_json(&app, "/reserve", reserve_body()).await;

        let body = serde_json::json!({
            "slices": { "s1": { "name": "alice", "id": "urn:alice", "email": "" } },
            "end_time": chrono::Utc::now() + chrono::Duration::minutes(90),
            "best_effort": true,
        })
        .to_string();
        let resp = post_json(&app, "/slices/renew", body).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_reserve_is_bad_request() {
        let (_dir, app, _store) = test_app(false).await;
        let body = serde_json::json!({ "slice_urn": "s1", "resources": [] }).to_string();
        let resp = post_json(&app, "/reserve", body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
