//! Console API surface: auth, enqueue, reads through the store, clears.

use std::sync::Arc;
use std::time::Duration;

use apalis::prelude::{MemoryStorage, MessageQueue};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use cachewire::application::{NotificationService, RequestScope};
use cachewire::infra::http::{router, ApiState, ApiToken};
use cachewire::infra::{InvalidationEmitter, TokenSigner};
use cachewire::store::MemoryBackend;
use cachewire_api_types::{
    NotificationEvent, NotificationListResponse, NotificationRecord, Severity,
};
use time::OffsetDateTime;
use tower::ServiceExt;

const API_TOKEN: &str = "cw_test_token";

fn state() -> ApiState {
    let signer =
        Arc::new(TokenSigner::new("api-test-secret", Duration::from_secs(60)).expect("signer"));
    // emissions go nowhere in these tests; they are fire-and-forget
    let emitter = InvalidationEmitter::new("http://127.0.0.1:9", signer, Duration::from_millis(100))
        .expect("emitter");
    ApiState {
        notifications: Arc::new(NotificationService::new(
            Arc::new(MemoryBackend::new()),
            emitter,
            None,
        )),
        queue: MemoryStorage::new(),
        token: ApiToken::new(API_TOKEN),
    }
}

fn request(method: &str, uri: &str, authorized: bool, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if authorized {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {API_TOKEN}"));
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn response_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = router(state());
    let response = app
        .oneshot(request("GET", "/v1/projects/p1/notifications", false, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_enqueues_the_notification_event() {
    let state = state();
    let queue = state.queue.clone();
    let app = router(state);

    let response = app
        .oneshot(request(
            "POST",
            "/v1/projects/p1/notifications",
            true,
            Some(serde_json::json!({
                "message": "Deploy started",
                "severity": "loading",
                "key": "r1"
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let accepted: cachewire_api_types::JobAccepted = response_json(response).await;
    assert_eq!(accepted.event, "console/notifications");
    assert_eq!(accepted.project_id, "p1");

    let mut queue = queue;
    let event: Option<NotificationEvent> = queue.dequeue().await.expect("dequeue");
    let event = event.expect("event enqueued");
    assert_eq!(event.project_id, "p1");
    assert_eq!(event.key, "r1");
    assert_eq!(event.notification.message, "Deploy started");
    assert!(!event.notification.viewed);
}

#[tokio::test]
async fn malformed_create_body_is_rejected() {
    let app = router(state());
    let response = app
        .oneshot(request(
            "POST",
            "/v1/projects/p1/notifications",
            true,
            Some(serde_json::json!({ "severity": "info", "key": "r1" })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn list_reads_through_the_store() {
    let state = state();

    // seed the store through the executor path
    let scope = RequestScope::server("p1");
    state
        .notifications
        .append(
            &scope,
            &NotificationEvent {
                project_id: "p1".to_string(),
                key: "r1".to_string(),
                notification: NotificationRecord {
                    id: None,
                    timestamp: OffsetDateTime::now_utc(),
                    message: "seeded".to_string(),
                    severity: Severity::Info,
                    viewed: false,
                },
            },
        )
        .await
        .expect("seed");

    let app = router(state);
    let response = app
        .oneshot(request("GET", "/v1/projects/p1/notifications", true, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let listed: NotificationListResponse = response_json(response).await;
    assert_eq!(listed.notifications.len(), 1);
    assert_eq!(listed.notifications[0].message, "seeded");
}

#[tokio::test]
async fn viewed_marks_everything_and_returns_the_list() {
    let state = state();
    let scope = RequestScope::server("p1");
    for message in ["one", "two"] {
        state
            .notifications
            .append(
                &scope,
                &NotificationEvent {
                    project_id: "p1".to_string(),
                    key: "r1".to_string(),
                    notification: NotificationRecord {
                        id: None,
                        timestamp: OffsetDateTime::now_utc(),
                        message: message.to_string(),
                        severity: Severity::Info,
                        viewed: false,
                    },
                },
            )
            .await
            .expect("seed");
    }

    let app = router(state);
    let response = app
        .oneshot(request(
            "POST",
            "/v1/projects/p1/notifications/viewed",
            true,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let listed: NotificationListResponse = response_json(response).await;
    assert_eq!(listed.notifications.len(), 2);
    assert!(listed.notifications.iter().all(|n| n.viewed));
}

#[tokio::test]
async fn delete_clears_the_whole_list() {
    let state = state();
    let scope = RequestScope::server("p1");
    state
        .notifications
        .append(
            &scope,
            &NotificationEvent {
                project_id: "p1".to_string(),
                key: "r1".to_string(),
                notification: NotificationRecord {
                    id: None,
                    timestamp: OffsetDateTime::now_utc(),
                    message: "to clear".to_string(),
                    severity: Severity::Warn,
                    viewed: false,
                },
            },
        )
        .await
        .expect("seed");

    let notifications = Arc::clone(&state.notifications);
    let app = router(state);

    let response = app
        .clone()
        .oneshot(request("DELETE", "/v1/projects/p1/notifications", true, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let listed = notifications.list(&scope).await.expect("list");
    assert!(listed.is_empty());

    let response = app
        .oneshot(request("GET", "/v1/projects/p1/notifications", true, None))
        .await
        .expect("response");
    let listed: NotificationListResponse = response_json(response).await;
    assert!(listed.notifications.is_empty());
}
