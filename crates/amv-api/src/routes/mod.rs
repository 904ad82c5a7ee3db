pub mod server;
pub mod update;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};

use crate::request_log::request_log;
use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    let v1 = Router::new()
        // Update runs
        .route("/mod/update", post(update::update_mod))
        .route("/mod/status", get(update::get_status))
        // Server teardown
        .route("/server", delete(server::delete_server))
        .route("/health", get(server::health));

    Router::new()
        .nest("/api/v1", v1)
        .layer(middleware::from_fn(request_log))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use amv_core::config::AmvConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::request_log::REQUEST_ID_HEADER;

    /// A loopback port with nothing listening on it.
    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Panel and feed both point at a closed port, and nothing is retried.
    fn app() -> Router {
        let dead = format!("http://127.0.0.1:{}", closed_port());
        let vars = HashMap::from([
            ("PTERODACTYL_API_URL", dead.clone()),
            ("PTERODACTYL_API_KEY", "ptla_test".to_string()),
            ("PTERODACTYL_OWNER_ID", "1".to_string()),
            ("PTERODACTYL_EGG_ID", "2".to_string()),
            ("MODRINTH_API_URL", dead),
            ("MOD_ID", "pkg".to_string()),
            ("RETRY_MAX_ATTEMPTS", "1".to_string()),
            ("REMOTE_CALL_TIMEOUT_SECS", "5".to_string()),
        ]);
        let config = AmvConfig::from_lookup(|name: &str| vars.get(name).cloned()).unwrap();
        let coordinator = Arc::new(amv_core::build_coordinator(&config));
        api_router(AppState { coordinator })
    }

    async fn call(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn status_without_a_server() {
        let (status, body) = call(app(), "GET", "/api/v1/mod/status", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_instance"], false);
        assert_eq!(body["instance_state"], "unknown");
        assert_eq!(body["instance_id"], Value::Null);
        assert_eq!(body["lifecycle"], "empty");
    }

    #[tokio::test]
    async fn deleting_nothing_succeeds() {
        let (status, body) = call(app(), "DELETE", "/api/v1/server", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn health_reports_an_unreachable_panel() {
        let (status, body) = call(app(), "GET", "/api/v1/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["panel_reachable"], false);
    }

    #[tokio::test]
    async fn malformed_update_body_is_a_bad_request() {
        let (status, body) = call(app(), "POST", "/api/v1/mod/update", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid request body"));
    }

    #[tokio::test]
    async fn failed_update_names_the_stage() {
        let (status, body) = call(app(), "POST", "/api/v1/mod/update", "").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(body["details"]["stage"], "provision");
        assert_eq!(body["details"]["cleaned_up"], true);
    }
}
