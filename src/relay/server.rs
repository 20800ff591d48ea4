//! Relay HTTP surface: authenticated ingress, WebSocket subscribe, health.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use uuid::Uuid;

use cachewire_api_types::{InvalidationMessage, RelayEnvelope, RelayReceipt};

use crate::infra::signer::{AuthError, TokenSigner};

use super::rooms::RoomRegistry;

const METRIC_RELAY_PUBLISH_TOTAL: &str = "cachewire_relay_publish_total";
const METRIC_RELAY_LAGGED_TOTAL: &str = "cachewire_relay_lagged_total";

#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<RoomRegistry>,
    pub signer: Arc<TokenSigner>,
}

/// Build the relay router.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/ping", post(ping))
        .route("/sub/{room}", get(subscribe))
        .route("/healthz", get(healthz))
        .with_state(state)
}

struct Unauthorized(AuthError);

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        debug!(error = %self.0, "relay credential rejected");
        (StatusCode::UNAUTHORIZED, "invalid credential").into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, Unauthorized> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(Unauthorized(AuthError::Malformed))
}

/// Ingress: verify the signed credential, fan the message out to the room.
async fn ping(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(message): Json<InvalidationMessage>,
) -> Result<Json<RelayReceipt>, Unauthorized> {
    let token = bearer_token(&headers)?;
    let claims = state.signer.verify(token).map_err(Unauthorized)?;

    let envelope = RelayEnvelope {
        data: message.content,
    };
    let delivered = state.registry.publish(&message.room, &envelope);

    counter!(METRIC_RELAY_PUBLISH_TOTAL).increment(1);
    info!(
        target = "relay::ping",
        room = message.room,
        identity = claims.id,
        delivered,
        "invalidation fanned out"
    );

    Ok(Json(RelayReceipt {
        room: message.room,
        delivered,
    }))
}

#[derive(Debug, Deserialize)]
struct SubscribeParams {
    token: String,
}

/// Subscribe: verify the credential, then upgrade and stream envelopes.
async fn subscribe(
    State(state): State<RelayState>,
    Path(room): Path<String>,
    Query(params): Query<SubscribeParams>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, Unauthorized> {
    let claims = state.signer.verify(&params.token).map_err(Unauthorized)?;

    info!(
        target = "relay::subscribe",
        room, identity = claims.id, "subscriber joining"
    );

    let registry = Arc::clone(&state.registry);
    Ok(upgrade.on_upgrade(move |socket| stream_room(socket, registry, room)))
}

async fn stream_room(socket: WebSocket, registry: Arc<RoomRegistry>, room: String) {
    let connection_id = Uuid::new_v4();
    let mut feed = registry.subscribe(&room);
    let (mut sink, mut source) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    // the subscriber fell behind; missed invalidations
                    // degrade to staleness until its next refetch
                    counter!(METRIC_RELAY_LAGGED_TOTAL).increment(missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = source.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    registry.prune(&room);
    debug!(room, connection_id = %connection_id, "subscriber left");
}

async fn healthz(State(state): State<RelayState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "rooms": state.registry.room_count(),
        "subscribers": state.registry.subscriber_count(),
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use cachewire_api_types::InvalidationContent;
    use tower::ServiceExt;

    use super::*;

    fn state() -> RelayState {
        RelayState {
            registry: Arc::new(RoomRegistry::new(16)),
            signer: Arc::new(
                TokenSigner::new("test-secret", Duration::from_secs(60)).expect("signer"),
            ),
        }
    }

    fn ping_request(token: Option<&str>) -> Request<Body> {
        let body = serde_json::to_string(&InvalidationMessage {
            room: "p1".to_string(),
            content: InvalidationContent::keys(["notifications"]),
        })
        .expect("body");

        let mut builder = Request::builder()
            .method("POST")
            .uri("/ping")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body)).expect("request")
    }

    #[tokio::test]
    async fn ping_requires_credential() {
        let app = router(state());
        let response = app.oneshot(ping_request(None)).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ping_rejects_foreign_credential() {
        let relay = state();
        let foreign = TokenSigner::new("other-secret", Duration::from_secs(60)).expect("signer");
        let app = router(relay);

        let response = app
            .oneshot(ping_request(Some(&foreign.sign_server())))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ping_delivers_to_room_subscribers() {
        let relay = state();
        let mut feed = relay.registry.subscribe("p1");
        let token = relay.signer.sign_server();
        let app = router(relay);

        let response = app
            .oneshot(ping_request(Some(&token)))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let text = feed.recv().await.expect("delivered");
        let envelope: RelayEnvelope = serde_json::from_str(&text).expect("envelope");
        assert!(matches!(envelope.data, InvalidationContent::Many(_)));
    }

    #[tokio::test]
    async fn healthz_reports_room_counts() {
        let relay = state();
        let _feed = relay.registry.subscribe("p1");
        let app = router(relay);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["rooms"], 1);
        assert_eq!(value["subscribers"], 1);
    }
}
