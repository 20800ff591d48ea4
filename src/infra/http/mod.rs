//! Console API: the authenticated inbound edge that produces mutation
//! events and serves reads through the typed keyed store.
//!
//! Authentication proper is an external capability; a static bearer token
//! stands in for it and every handler derives an explicit [`RequestScope`]
//! from it plus the project in the path.

mod auth;

use std::sync::Arc;

use apalis::prelude::MemoryStorage;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::info;

use cachewire_api_types::{
    CreateNotificationRequest, JobAccepted, NotificationEvent, NotificationListResponse,
    NotificationRecord, NOTIFICATION_EVENT,
};

use crate::application::jobs::enqueue_notification_event;
use crate::application::{AppError, NotificationService, RequestScope};

pub use auth::ApiToken;

#[derive(Clone)]
pub struct ApiState {
    pub notifications: Arc<NotificationService>,
    pub queue: MemoryStorage<NotificationEvent>,
    pub token: ApiToken,
}

/// Build the console API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/v1/projects/{project_id}/notifications",
            post(create_notification)
                .get(list_notifications)
                .delete(clear_notifications),
        )
        .route(
            "/v1/projects/{project_id}/notifications/viewed",
            post(mark_all_viewed),
        )
        .with_state(state)
}

fn scope_for(state: &ApiState, headers: &HeaderMap, project_id: &str) -> Result<RequestScope, AppError> {
    let identity = state.token.authorize(headers)?;
    Ok(RequestScope::new(identity, project_id))
}

/// Accept a notification and enqueue the `console/notifications` event; the
/// executor performs the mutation out of band.
async fn create_notification(
    State(state): State<ApiState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    let scope = scope_for(&state, &headers, &project_id)?;

    let event = NotificationEvent {
        project_id: scope.tenant.clone(),
        key: request.key,
        notification: NotificationRecord {
            id: None,
            timestamp: OffsetDateTime::now_utc(),
            message: request.message,
            severity: request.severity,
            viewed: request.viewed,
        },
    };

    let mut queue = state.queue.clone();
    enqueue_notification_event(&mut queue, event).await?;

    info!(
        target = "infra::http::create_notification",
        project_id = scope.tenant,
        identity = scope.identity,
        "notification event enqueued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            event: NOTIFICATION_EVENT.to_string(),
            project_id: scope.tenant,
        }),
    ))
}

async fn list_notifications(
    State(state): State<ApiState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<NotificationListResponse>, AppError> {
    let scope = scope_for(&state, &headers, &project_id)?;
    let notifications = state.notifications.list(&scope).await?;
    Ok(Json(NotificationListResponse { notifications }))
}

async fn mark_all_viewed(
    State(state): State<ApiState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<NotificationListResponse>, AppError> {
    let scope = scope_for(&state, &headers, &project_id)?;
    let outcome = state.notifications.mark_all_viewed(&scope).await?;
    Ok(Json(NotificationListResponse {
        notifications: outcome.notifications,
    }))
}

async fn clear_notifications(
    State(state): State<ApiState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let scope = scope_for(&state, &headers, &project_id)?;
    state.notifications.clear(&scope).await?;
    Ok(StatusCode::NO_CONTENT)
}
