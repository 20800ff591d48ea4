//! Relay subscription: one long-lived WebSocket per session.
//!
//! Connection lifecycle: `Disconnected -> Connecting -> Connected`, back to
//! `Disconnected` on close or transport error. Messages from one connection
//! are handled as an ordered sequence. Reconnection is the caller's policy,
//! not decided here.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use cachewire_api_types::{InvalidationContent, KeyRef, RelayEnvelope};

use super::cache::{QueryCache, QueryScope};
use super::error::SubscribeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::SeqCst) {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Connected,
        }
    }
}

/// A live subscription to one room.
///
/// Dropping (or calling [`Subscription::unsubscribe`]) aborts the handler
/// task before anything else is torn down, so no message is ever delivered
/// to a subscriber that no longer exists.
pub struct Subscription {
    state: Arc<StateCell>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Tear the subscription down.
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
        self.state.set(ConnectionState::Disconnected);
    }
}

/// Map one relay envelope onto the local cache, returning how many logical
/// keys were invalidated.
///
/// Array content is handled item by item: the part of a compact key before
/// the first `::` is the logical key, the routing suffix is discarded.
/// Single-string content is treated as a one-element array. Object payloads
/// carry no key list and are ignored.
pub fn apply_envelope(envelope: &RelayEnvelope, scope: &QueryScope, cache: &QueryCache) -> usize {
    match &envelope.data {
        InvalidationContent::Many(keys) => {
            for key in keys {
                invalidate(key, scope, cache);
            }
            keys.len()
        }
        InvalidationContent::One(raw) => {
            invalidate(&KeyRef::compact(raw.as_str()), scope, cache);
            1
        }
        InvalidationContent::Other(value) => {
            debug!(payload = %value, "ignoring non-key invalidation payload");
            0
        }
    }
}

fn invalidate(key: &KeyRef, scope: &QueryScope, cache: &QueryCache) {
    let logical = key.logical_key();
    let existed = cache.mark_stale(logical, scope);
    debug!(logical, tenant = scope.tenant, existed, "query invalidated");
}

fn subscribe_url(relay_url: &str, room: &str, token: &str) -> Result<Url, SubscribeError> {
    let mut url = Url::parse(relay_url)?;
    match url.scheme() {
        "http" | "ws" => {
            let _ = url.set_scheme("ws");
        }
        "https" | "wss" => {
            let _ = url.set_scheme("wss");
        }
        other => return Err(SubscribeError::UnsupportedScheme(other.to_string())),
    }
    url.set_path(&format!("/sub/{room}"));
    url.set_query(Some(&format!("token={token}")));
    Ok(url)
}

/// Open the session's subscription to `room`.
///
/// `scope` carries the tenant and auth token every invalidated cache key is
/// scoped under; `cache` is the query cache invalidations apply to.
pub async fn subscribe(
    relay_url: &str,
    room: &str,
    token: &str,
    scope: QueryScope,
    cache: Arc<QueryCache>,
) -> Result<Subscription, SubscribeError> {
    let url = subscribe_url(relay_url, room, token)?;
    let state = Arc::new(StateCell::new(ConnectionState::Connecting));

    let (stream, _response) = connect_async(url.as_str()).await?;
    state.set(ConnectionState::Connected);
    info!(room, "relay subscription established");

    let task_state = Arc::clone(&state);
    let room_name = room.to_string();
    let task = tokio::spawn(async move {
        let (_sink, mut source) = stream.split();

        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<RelayEnvelope>(&text) {
                    Ok(envelope) => {
                        apply_envelope(&envelope, &scope, &cache);
                    }
                    Err(err) => {
                        debug!(error = %err, "undecodable relay message skipped");
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(room = room_name, error = %err, "relay stream error");
                    break;
                }
            }
        }

        task_state.set(ConnectionState::Disconnected);
        debug!(room = room_name, "relay subscription closed");
    });

    Ok(Subscription { state, task })
}
