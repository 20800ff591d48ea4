//! Notification mutations.
//!
//! The executor's unit of work: validate, update the typed keyed store,
//! then hand the affected logical keys to the emitter. The emitter call
//! happens strictly after the store update commits, by sequential await; it
//! runs as a detached task and can never fail the mutation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use cachewire_api_types::{
    InvalidationContent, KeyRef, NotificationEvent, NotificationRecord,
};

use crate::domain::keys::notifications_key;
use crate::domain::{NotificationListSchema, NotificationSchema, Schema};
use crate::infra::InvalidationEmitter;
use crate::store::{PutOptions, StoreBackend, TypedStore};

use super::error::AppError;
use super::scope::RequestScope;

/// Logical cache key of a project's notification list, as clients know it.
pub const NOTIFICATIONS_LOGICAL_KEY: &str = "notifications";

/// Result of a notification mutation: the stored list and the handle of the
/// detached publish task. The mutation path drops the handle; tests await it.
#[derive(Debug)]
pub struct UpdatedList {
    pub notifications: Vec<NotificationRecord>,
    pub emission: JoinHandle<()>,
}

/// Owns the write path to per-project notification lists.
pub struct NotificationService {
    store: TypedStore<Vec<NotificationRecord>>,
    emitter: InvalidationEmitter,
    retention: Option<Duration>,
}

impl NotificationService {
    pub fn new(
        backend: Arc<dyn StoreBackend>,
        emitter: InvalidationEmitter,
        retention: Option<Duration>,
    ) -> Self {
        Self {
            store: TypedStore::with_schema(backend, Arc::new(NotificationListSchema)),
            emitter,
            retention,
        }
    }

    fn write_opts(&self) -> PutOptions {
        PutOptions::default().with_ttl(self.retention)
    }

    /// Append one notification to the tenant's list, newest first, then
    /// broadcast which logical keys went stale.
    pub async fn append(
        &self,
        scope: &RequestScope,
        event: &NotificationEvent,
    ) -> Result<UpdatedList, AppError> {
        NotificationSchema.validate(&event.notification)?;

        let key = notifications_key(&scope.tenant);
        let notification = event.notification.clone();
        let notifications = self
            .store
            .update(&key, self.write_opts(), move |current| {
                let mut list = current.unwrap_or_default();
                list.insert(0, notification.clone());
                list
            })
            .await?;

        info!(
            target = "application::notifications",
            tenant = scope.tenant,
            identity = scope.identity,
            routing_key = event.key,
            count = notifications.len(),
            "notification appended"
        );

        let emission = self.emitter.ping(
            &scope.tenant,
            InvalidationContent::Many(vec![
                KeyRef::compact(NOTIFICATIONS_LOGICAL_KEY),
                KeyRef::compact(event.key.as_str()),
            ]),
        );

        Ok(UpdatedList {
            notifications,
            emission,
        })
    }

    /// Read the tenant's list; absent key reads as an empty list.
    pub async fn list(&self, scope: &RequestScope) -> Result<Vec<NotificationRecord>, AppError> {
        let key = notifications_key(&scope.tenant);
        Ok(self.store.get(&key).await?.unwrap_or_default())
    }

    /// Mark every notification viewed, then broadcast.
    pub async fn mark_all_viewed(&self, scope: &RequestScope) -> Result<UpdatedList, AppError> {
        let key = notifications_key(&scope.tenant);
        let notifications = self
            .store
            .update(&key, self.write_opts(), |current| {
                let mut list = current.unwrap_or_default();
                for notification in &mut list {
                    notification.viewed = true;
                }
                list
            })
            .await?;

        let emission = self.emitter.ping(
            &scope.tenant,
            InvalidationContent::keys([NOTIFICATIONS_LOGICAL_KEY]),
        );

        Ok(UpdatedList {
            notifications,
            emission,
        })
    }

    /// Clear the whole list key (the only deletion the model allows), then
    /// broadcast.
    pub async fn clear(&self, scope: &RequestScope) -> Result<JoinHandle<()>, AppError> {
        let key = notifications_key(&scope.tenant);
        self.store.delete(&key).await?;

        info!(
            target = "application::notifications",
            tenant = scope.tenant,
            identity = scope.identity,
            "notification list cleared"
        );

        Ok(self.emitter.ping(
            &scope.tenant,
            InvalidationContent::keys([NOTIFICATIONS_LOGICAL_KEY]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cachewire_api_types::Severity;
    use time::OffsetDateTime;

    use crate::infra::TokenSigner;
    use crate::store::MemoryBackend;

    use super::*;

    fn emitter() -> InvalidationEmitter {
        // nothing listens here; emissions are fire-and-forget and swallowed
        let signer =
            Arc::new(TokenSigner::new("test-secret", Duration::from_secs(60)).expect("signer"));
        InvalidationEmitter::new("http://127.0.0.1:9", signer, Duration::from_millis(100))
            .expect("emitter")
    }

    fn service(backend: Arc<MemoryBackend>) -> NotificationService {
        NotificationService::new(backend, emitter(), None)
    }

    fn event(project: &str, routing: &str, message: &str) -> NotificationEvent {
        NotificationEvent {
            project_id: project.to_string(),
            key: routing.to_string(),
            notification: NotificationRecord {
                id: None,
                timestamp: OffsetDateTime::now_utc(),
                message: message.to_string(),
                severity: Severity::Loading,
                viewed: false,
            },
        }
    }

    #[tokio::test]
    async fn append_to_empty_list_stores_singleton() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(backend);
        let scope = RequestScope::server("p1");

        let outcome = service
            .append(&scope, &event("p1", "r1", "Deploy started"))
            .await
            .expect("append");
        assert_eq!(outcome.notifications.len(), 1);
        assert_eq!(outcome.notifications[0].message, "Deploy started");
        outcome.emission.await.expect("emission task");

        let listed = service.list(&scope).await.expect("list");
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn append_prepends_newest_first() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(backend);
        let scope = RequestScope::server("p1");

        service
            .append(&scope, &event("p1", "r1", "older"))
            .await
            .expect("first");
        let outcome = service
            .append(&scope, &event("p1", "r1", "newer"))
            .await
            .expect("second");

        assert_eq!(outcome.notifications[0].message, "newer");
        assert_eq!(outcome.notifications[1].message, "older");
    }

    #[tokio::test]
    async fn malformed_notification_leaves_store_untouched() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(backend.clone());
        let scope = RequestScope::server("p1");

        let err = service
            .append(&scope, &event("p1", "r1", ""))
            .await
            .expect_err("blank message must fail validation");
        assert!(err.is_validation());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn lists_are_tenant_scoped() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(backend);

        service
            .append(&RequestScope::server("p1"), &event("p1", "r1", "for p1"))
            .await
            .expect("append p1");

        let other = service
            .list(&RequestScope::server("p2"))
            .await
            .expect("list p2");
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn mark_all_viewed_flips_every_entry() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(backend);
        let scope = RequestScope::server("p1");

        service
            .append(&scope, &event("p1", "r1", "one"))
            .await
            .expect("append");
        service
            .append(&scope, &event("p1", "r2", "two"))
            .await
            .expect("append");

        let outcome = service.mark_all_viewed(&scope).await.expect("viewed");
        assert!(outcome.notifications.iter().all(|n| n.viewed));
    }

    #[tokio::test]
    async fn clear_removes_the_whole_list() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(backend);
        let scope = RequestScope::server("p1");

        service
            .append(&scope, &event("p1", "r1", "one"))
            .await
            .expect("append");
        let emission = service.clear(&scope).await.expect("clear");
        emission.await.expect("emission task");

        assert!(service.list(&scope).await.expect("list").is_empty());
    }
}
