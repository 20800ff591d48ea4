//! Value schemas for the typed keyed store.
//!
//! A schema is an optional guard attached to a typed store: values are
//! checked before persist and after fetch, so corrupt data is rejected at
//! the boundary instead of flowing into callers.

use cachewire_api_types::NotificationRecord;

use super::error::DomainError;

/// Validates values of one stored type.
pub trait Schema<T>: Send + Sync {
    fn validate(&self, value: &T) -> Result<(), DomainError>;
}

const MAX_MESSAGE_LEN: usize = 4096;

/// Schema for a single notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationSchema;

impl Schema<NotificationRecord> for NotificationSchema {
    fn validate(&self, value: &NotificationRecord) -> Result<(), DomainError> {
        if value.message.trim().is_empty() {
            return Err(DomainError::validation("notification message is empty"));
        }
        if value.message.len() > MAX_MESSAGE_LEN {
            return Err(DomainError::validation(format!(
                "notification message exceeds {MAX_MESSAGE_LEN} bytes"
            )));
        }
        Ok(())
    }
}

/// Schema for a project's notification list: every element must pass
/// [`NotificationSchema`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationListSchema;

impl Schema<Vec<NotificationRecord>> for NotificationListSchema {
    fn validate(&self, value: &Vec<NotificationRecord>) -> Result<(), DomainError> {
        for (index, notification) in value.iter().enumerate() {
            NotificationSchema.validate(notification).map_err(|err| {
                DomainError::validation(format!("notification at index {index}: {err}"))
            })?;
        }
        Ok(())
    }
}
