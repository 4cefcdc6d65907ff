//! HTTP surface for Roomcast.
//!
//! Provides:
//! - `POST /notifications` - Create and broadcast a notification
//! - `POST /notifications/publish` - Queue a notification for the consumer
//! - `GET /sse/{room}` - Backfill plus live Server-Sent Events stream
//! - `/health` and `/ready` checks

pub mod error;
pub mod health;
pub mod publish;
pub mod subscribe;

pub use error::{ApiError, StatusBody};

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::server::ServerState;

/// Create the HTTP router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/ready", get(health::ready_handler))
        .route("/notifications", post(publish::create_notification))
        .route("/notifications/publish", post(publish::publish_notification))
        .route("/sse/:room", get(subscribe::stream_room))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "Handler panicked");
    ApiError::internal("internal error").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::flow::Hub;
    use crate::model::Notification;
    use crate::notify::NotificationService;
    use crate::queue::QueuePublisher;
    use crate::storage::testing::RecordingStore;
    use crate::storage::{MemoryStore, NotificationRepository};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use tokio_util::sync::CancellationToken;
    use tokio_util::task::TaskTracker;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        service: NotificationService,
        shutdown: CancellationToken,
    }

    fn harness_with(store: Arc<dyn NotificationRepository>, config: Config) -> Harness {
        let (hub, hub_loop) = Hub::new();
        let shutdown = CancellationToken::new();
        tokio::spawn(hub_loop.run(shutdown.clone()));
        let service = NotificationService::new(store, hub);
        let publisher = QueuePublisher::from_config(&config);
        let state = Arc::new(ServerState::new(
            service.clone(),
            publisher,
            &config,
            shutdown.clone(),
            TaskTracker::new(),
        ));
        Harness {
            app: create_router(state),
            service,
            shutdown,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(MemoryStore::new()), Config::test_config())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_untyped(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const VALID: &str = r#"{"room":"room-1","type":"info","title":"hello","body":"world"}"#;

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = harness()
            .app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_endpoint() {
        let response = harness()
            .app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_returns_created_notification() {
        let response = harness()
            .app
            .oneshot(post_json("/notifications", VALID))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let created: Notification = body_json(response).await;
        assert_eq!(created.id, 1);
        assert_eq!(created.room, "room-1");
        assert_eq!(created.title, "hello");
    }

    #[tokio::test]
    async fn test_create_rejects_missing_fields() {
        let response = harness()
            .app
            .oneshot(post_json("/notifications", r#"{"room":"room-1","type":"info"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: StatusBody = body_json(response).await;
        assert_eq!(body.code, "bad_request");
        assert_eq!(body.message, "room, type, title, body are required");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_type() {
        let response = harness()
            .app
            .oneshot(post_json(
                "/notifications",
                r#"{"room":"room-1","type":"bad","title":"t","body":"b"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: StatusBody = body_json(response).await;
        assert_eq!(body.message, "type must be one of: info, warning, system");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_json() {
        let response = harness()
            .app
            .oneshot(post_json("/notifications", "{bad json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: StatusBody = body_json(response).await;
        assert_eq!(body.message, "invalid json");
    }

    #[tokio::test]
    async fn test_create_accepts_json_without_content_type() {
        let response = harness()
            .app
            .oneshot(post_untyped("/notifications", VALID))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let created: Notification = body_json(response).await;
        assert_eq!(created.room, "room-1");
    }

    #[tokio::test]
    async fn test_create_store_failure_is_internal_error() {
        let h = harness_with(Arc::new(RecordingStore::failing()), Config::test_config());
        let response = h.app.oneshot(post_json("/notifications", VALID)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: StatusBody = body_json(response).await;
        assert_eq!(body.code, "internal_error");
        assert_eq!(body.message, "failed to create notification");
    }

    #[tokio::test]
    async fn test_publish_queued_without_broker() {
        let store = Arc::new(RecordingStore::new());
        let h = harness_with(store.clone(), Config::test_config());
        let response = h
            .app
            .oneshot(post_json("/notifications/publish", VALID))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body: StatusBody = body_json(response).await;
        assert_eq!(body.code, "queued");
        assert_eq!(body.message, "queued");
        // Publishing never writes through the store directly.
        assert_eq!(store.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_publish_accepts_json_without_content_type() {
        let response = harness()
            .app
            .oneshot(post_untyped("/notifications/publish", VALID))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_publish_validates_before_queueing() {
        let response = harness()
            .app
            .oneshot(post_json(
                "/notifications/publish",
                r#"{"room":"room-1","type":"alert","title":"t","body":"b"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: StatusBody = body_json(response).await;
        assert_eq!(body.message, "type must be one of: info, warning, system");
    }

    #[tokio::test]
    async fn test_publish_broker_failure_is_internal_error() {
        let config = Config {
            amqp_url: Some("amqp://127.0.0.1:1/%2f".into()),
            ..Config::test_config()
        };
        let h = harness_with(Arc::new(MemoryStore::new()), config);
        let response = h
            .app
            .oneshot(post_json("/notifications/publish", VALID))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: StatusBody = body_json(response).await;
        assert_eq!(body.message, "failed to publish notification");
    }

    #[tokio::test]
    async fn test_stream_headers_and_backfill_frame() {
        let h = harness();
        let created = h
            .service
            .create(crate::NotificationPayload::new("room-1", "warning", "disk", "full"))
            .await
            .unwrap();

        let response = h
            .app
            .oneshot(
                Request::builder()
                    .uri("/sse/room-1?limit=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["content-type"], "text/event-stream");
        assert_eq!(headers["cache-control"], "no-cache");
        assert_eq!(headers["x-accel-buffering"], "no");

        let mut body = response.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        let json = serde_json::to_string(&created).unwrap();
        assert_eq!(
            text,
            format!("id: {}\nevent: notification\ndata: {json}\n\n", created.id)
        );

        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_stream_ends_on_shutdown() {
        let h = harness();
        let response = h
            .app
            .oneshot(Request::builder().uri("/sse/room-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut body = response.into_body().into_data_stream();

        h.shutdown.cancel();
        let next = tokio::time::timeout(std::time::Duration::from_secs(2), body.next())
            .await
            .expect("stream did not end on shutdown");
        assert!(next.is_none());
    }
}
