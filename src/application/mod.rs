pub mod error;
pub mod jobs;
pub mod notifications;
pub mod scope;

pub use error::AppError;
pub use notifications::NotificationService;
pub use scope::RequestScope;
