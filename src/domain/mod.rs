pub mod error;
pub mod keys;
pub mod schema;

pub use error::DomainError;
pub use keys::StoreKey;
pub use schema::{NotificationListSchema, NotificationSchema, Schema};
