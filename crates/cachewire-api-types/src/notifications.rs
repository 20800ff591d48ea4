//! Notification records and the event payload that triggers the executor.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Event name the job engine dispatches notification mutations under.
pub const NOTIFICATION_EVENT: &str = "console/notifications";

/// Severity of a console notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Loading,
    Info,
    Warn,
    Error,
}

/// A single console notification.
///
/// Notifications are prepended to a per-project list (newest first) and are
/// never removed individually; only the whole list key can be cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub timestamp: OffsetDateTime,
    pub message: String,
    pub severity: Severity,
    pub viewed: bool,
}

/// Payload of a `console/notifications` event.
///
/// `key` is the opaque routing key the emitter forwards alongside the
/// logical key, so one logical cache entry can be invalidated differently
/// per originating action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "projectId")]
    pub project_id: String,
    pub key: String,
    pub notification: NotificationRecord,
}

/// Request body for creating a notification through the console API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationRequest {
    pub message: String,
    pub severity: Severity,
    #[serde(default)]
    pub viewed: bool,
    /// Routing key forwarded in the invalidation broadcast.
    pub key: String,
}

/// Acknowledgement returned when a mutation has been enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAccepted {
    pub event: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
}

/// Response body listing a project's notifications, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationRecord>,
}
