//! API route definitions

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::{
    handlers::{logging, processes, status},
    middleware::logging_middleware,
    state::AppState,
};

/// Prefix every route is served under.
pub const API_PREFIX: &str = "/jasper/v1";

/// Process, manager and logging-cache routes relative to [`API_PREFIX`]
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Service
        .route("/", get(status::status))
        .route("/id", get(status::id))
        // Manager
        .route("/create", post(processes::create))
        .route("/list/{filter}", get(processes::list))
        .route("/list/group/{name}", get(processes::group))
        .route("/clear", post(processes::clear))
        .route("/close", delete(processes::close))
        // Processes
        .route("/process/{id}", get(processes::get))
        .route(
            "/process/{id}/tags",
            get(processes::get_tags)
                .post(processes::add_tag)
                .delete(processes::reset_tags),
        )
        .route("/process/{id}/wait", get(processes::wait))
        .route("/process/{id}/respawn", post(processes::respawn))
        .route("/process/{id}/signal/{signal}", patch(processes::signal))
        .route(
            "/process/{id}/trigger/signal/{trigger_id}",
            patch(processes::register_signal_trigger),
        )
        .route("/process/{id}/logs", get(processes::logs))
        // Logging cache
        .route(
            "/logging/id/{id}",
            post(logging::create).get(logging::get).delete(logging::remove),
        )
        .route("/logging/id/{id}/send", post(logging::send))
        .route("/logging/prune/{ttl}", delete(logging::prune))
        .route("/logging/size", get(logging::size))
}

/// The complete application, ready to serve
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(API_PREFIX, api_routes())
        .layer(middleware::from_fn(logging_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use jasper_manager::{BasicManager, Manager, ManagerHandle};
    use jasper_process::{MockProcess, ProcessInfo};
    use serde::de::DeserializeOwned;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::models::{IdResponse, OutcomeResponse, SizeResponse, StatusResponse};

    fn app() -> (Router, BasicManager) {
        let manager = BasicManager::new(false);
        let handle: ManagerHandle = Arc::new(manager.clone());
        let state = AppState::new(handle, manager.logging_cache(), CancellationToken::new());
        (router(state), manager)
    }

    async fn call(app: &Router, method: Method, path: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(format!("{}{}", API_PREFIX, path))
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_and_id() {
        let (app, manager) = app();

        let (status, body) = call(&app, Method::GET, "/id", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decode::<IdResponse>(&body).id, manager.id());

        let (status, body) = call(&app, Method::GET, "", None).await;
        assert_eq!(status, StatusCode::OK);
        let service: StatusResponse = decode(&body);
        assert!(service.active);
        assert_eq!(service.pid, std::process::id());
    }

    #[tokio::test]
    async fn test_unknown_process_is_404_with_outcome() {
        let (app, _) = app();

        let (status, body) = call(&app, Method::GET, "/process/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let outcome: OutcomeResponse = decode(&body);
        assert!(!outcome.success);
        assert!(outcome.text.contains("nope"));
    }

    #[tokio::test]
    async fn test_bad_filter_and_body_are_400() {
        let (app, _) = app();

        let (status, body) = call(&app, Method::GET, "/list/sleeping", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!decode::<OutcomeResponse>(&body).success);

        let (status, _) = call(&app, Method::POST, "/create", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::POST, "/create", Some(r#"{"args": []}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_registered_process_routes() {
        let (app, manager) = app();
        let ctx = CancellationToken::new();
        let mock = Arc::new(MockProcess::new("p1"));
        manager.register(&ctx, mock.clone()).await.unwrap();

        let (status, body) = call(&app, Method::GET, "/process/p1", None).await;
        assert_eq!(status, StatusCode::OK);
        let info: ProcessInfo = decode(&body);
        assert_eq!(info.id, "p1");
        assert!(info.is_running);

        let (status, _) = call(&app, Method::POST, "/process/p1/tags?add=batch", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, Method::POST, "/process/p1/tags?add=batch", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, Method::GET, "/process/p1/tags", None).await;
        assert_eq!(decode::<Vec<String>>(&body), vec!["batch".to_string()]);

        let (_, body) = call(&app, Method::GET, "/list/group/batch", None).await;
        assert_eq!(decode::<Vec<ProcessInfo>>(&body).len(), 1);

        let (status, _) = call(&app, Method::POST, "/process/p1/tags", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::DELETE, "/process/p1/tags", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, Method::GET, "/list/group/batch", None).await;
        assert!(decode::<Vec<ProcessInfo>>(&body).is_empty());

        let (_, body) = call(&app, Method::GET, "/list/running", None).await;
        assert_eq!(decode::<Vec<ProcessInfo>>(&body).len(), 1);
    }

    #[tokio::test]
    async fn test_signal_routes() {
        let (app, manager) = app();
        let ctx = CancellationToken::new();
        let mock = Arc::new(MockProcess::new("p1"));
        manager.register(&ctx, mock.clone()).await.unwrap();

        let (status, _) = call(&app, Method::PATCH, "/process/p1/signal/15", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mock.signals(), vec![jasper_process::Signal::Terminate]);

        let (status, _) = call(&app, Method::PATCH, "/process/p1/signal/-3", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, Method::PATCH, "/process/p1/signal/term", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            call(&app, Method::PATCH, "/process/p1/trigger/signal/no-such-trigger", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        mock.finish(0);
        let (status, body) = call(&app, Method::PATCH, "/process/p1/signal/9", None).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert!(decode::<OutcomeResponse>(&body).text.contains("terminated"));
    }

    #[tokio::test]
    async fn test_wait_reports_exit_codes() {
        let (app, manager) = app();
        let ctx = CancellationToken::new();
        let mock = Arc::new(MockProcess::new("p1"));
        manager.register(&ctx, mock.clone()).await.unwrap();
        mock.finish(3);

        let (status, body) = call(&app, Method::GET, "/process/p1/wait", None).await;
        assert_eq!(status, StatusCode::OK);
        let wait: crate::models::WaitResponse = decode(&body);
        assert_eq!(wait.exit_code, 3);
        assert!(wait.error.is_some());
    }

    #[tokio::test]
    async fn test_clear_and_close() {
        let (app, manager) = app();
        let ctx = CancellationToken::new();
        let done = Arc::new(MockProcess::new("done"));
        manager.register(&ctx, done.clone()).await.unwrap();
        done.finish(0);

        let (status, _) = call(&app, Method::POST, "/clear", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(manager.is_empty());

        let (status, body) = call(&app, Method::DELETE, "/close", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(decode::<OutcomeResponse>(&body).success);
    }

    #[tokio::test]
    async fn test_logging_cache_routes() {
        let (app, manager) = app();

        let options = r#"{"loggers": [{"type": "in-memory", "options": {"in_memory_cap": 10}}]}"#;
        let (status, body) = call(&app, Method::POST, "/logging/id/build", Some(options)).await;
        assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
        let (status, _) = call(&app, Method::POST, "/logging/id/build", Some(options)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = call(&app, Method::GET, "/logging/size", None).await;
        assert_eq!(decode::<SizeResponse>(&body).size, 1);

        let payload = r#"{"data": ["one", "two"]}"#;
        let (status, _) = call(&app, Method::POST, "/logging/id/build/send", Some(payload)).await;
        assert_eq!(status, StatusCode::OK);
        let logger = manager.logging_cache().get("build").unwrap();
        assert_eq!(
            logger.options().in_memory_lines(10).unwrap(),
            vec!["one".to_string(), "two".to_string()]
        );

        let (status, _) = call(&app, Method::POST, "/logging/id/other/send", Some(payload)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::DELETE, "/logging/prune/-1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (_, body) = call(&app, Method::DELETE, "/logging/prune/3600", None).await;
        assert_eq!(decode::<crate::models::PruneResponse>(&body).removed, 0);

        let (status, _) = call(&app, Method::DELETE, "/logging/id/build", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, Method::GET, "/logging/id/build", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
