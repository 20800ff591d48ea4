//! The `console/notifications` job: the executor's entry point.
//!
//! Dispatched at-least-once by the job engine; a malformed payload is
//! logged and dropped so it can never crash the dispatcher, while transient
//! store failures propagate so the engine retries the whole step.

use apalis::prelude::{Data, Error as ApalisError, MessageQueue};
use tracing::{error, info};

use cachewire_api_types::{NotificationEvent, NOTIFICATION_EVENT};

use crate::application::error::AppError;
use crate::application::scope::RequestScope;

use super::context::{job_failed, JobWorkerContext};

/// Enqueue a notification event for the worker.
pub async fn enqueue_notification_event<Q>(
    queue: &mut Q,
    event: NotificationEvent,
) -> Result<(), AppError>
where
    Q: MessageQueue<NotificationEvent>,
    Q::Error: std::fmt::Debug,
{
    queue.enqueue(event).await.map_err(|err| {
        AppError::unexpected(format!("failed to enqueue {NOTIFICATION_EVENT}: {err:?}"))
    })
}

/// Process one `console/notifications` event.
pub async fn process_notification_job(
    event: NotificationEvent,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    let scope = RequestScope::server(event.project_id.clone());

    match ctx.notifications.append(&scope, &event).await {
        Ok(outcome) => {
            info!(
                target = "application::jobs::process_notification_job",
                project_id = event.project_id,
                routing_key = event.key,
                count = outcome.notifications.len(),
                "notification event processed"
            );
            Ok(())
        }
        Err(err) if err.is_validation() => {
            // malformed notifications are dropped, not retried
            error!(
                target = "application::jobs::process_notification_job",
                project_id = event.project_id,
                error = %err,
                "malformed notification dropped"
            );
            Ok(())
        }
        Err(err) => Err(job_failed(err)),
    }
}
