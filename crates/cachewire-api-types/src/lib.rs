//! Shared wire and API types for the Cachewire invalidation pipeline.
//!
//! Everything that crosses a process boundary lives here: notification
//! records, invalidation messages published to the relay, the envelope the
//! relay delivers to subscribers, and the request/response bodies of the
//! console API.

mod invalidation;
mod notifications;

pub use invalidation::{
    InvalidationContent, InvalidationMessage, KeyRef, RelayEnvelope, RelayReceipt,
};
pub use notifications::{
    CreateNotificationRequest, JobAccepted, NotificationEvent, NotificationListResponse,
    NotificationRecord, Severity, NOTIFICATION_EVENT,
};
