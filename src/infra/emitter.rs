//! Invalidation emitter.
//!
//! Turns "a mutation happened" into a best-effort publish to the relay
//! ingress. The publish runs as a spawned task after the mutation's success:
//! it can never block or fail the mutation path. Failures are logged and
//! counted, never retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use cachewire_api_types::{InvalidationContent, InvalidationMessage};

use super::error::InfraError;
use super::signer::TokenSigner;

const METRIC_EMIT_TOTAL: &str = "cachewire_emit_total";
const METRIC_EMIT_DROPPED_TOTAL: &str = "cachewire_emit_dropped_total";
const METRIC_EMIT_MS: &str = "cachewire_emit_ms";

/// Publishes invalidation messages to the relay ingress.
#[derive(Clone)]
pub struct InvalidationEmitter {
    client: Client,
    ping_url: Url,
    signer: Arc<TokenSigner>,
}

impl InvalidationEmitter {
    /// Build an emitter for the given ingress origin.
    ///
    /// Fails fast on an unparseable ingress URL, before any mutation is
    /// attempted.
    pub fn new(
        ingress: &str,
        signer: Arc<TokenSigner>,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        let base = Url::parse(ingress)
            .map_err(|err| InfraError::endpoint(ingress, err.to_string()))?;
        let ping_url = base
            .join("/ping")
            .map_err(|err| InfraError::endpoint(ingress, err.to_string()))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cachewire/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| InfraError::configuration(format!("http client: {err}")))?;

        Ok(Self {
            client,
            ping_url,
            signer,
        })
    }

    /// Publish `content` to every subscriber of `room`, fire-and-forget.
    ///
    /// Returns the handle of the spawned publish task; the mutation path
    /// ignores it, tests may await it.
    pub fn ping(&self, room: &str, content: InvalidationContent) -> JoinHandle<()> {
        counter!(METRIC_EMIT_TOTAL).increment(1);

        let client = self.client.clone();
        let url = self.ping_url.clone();
        let token = self.signer.sign_server();
        let message = InvalidationMessage {
            room: room.to_string(),
            content,
        };

        tokio::spawn(async move {
            let started_at = Instant::now();
            let result = client
                .post(url)
                .bearer_auth(token)
                .json(&message)
                .send()
                .await
                .and_then(|response| response.error_for_status());

            histogram!(METRIC_EMIT_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

            match result {
                Ok(_) => {
                    debug!(room = message.room, "invalidation published");
                }
                Err(err) => {
                    // dropped emissions degrade to staleness until the next
                    // refetch; the mutation itself already succeeded
                    counter!(METRIC_EMIT_DROPPED_TOTAL).increment(1);
                    warn!(
                        room = message.room,
                        error = %err,
                        "invalidation publish dropped"
                    );
                }
            }
        })
    }
}
