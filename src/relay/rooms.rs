//! Room registry: one broadcast channel per tenant room.

use dashmap::DashMap;
use metrics::gauge;
use tokio::sync::broadcast;
use tracing::debug;

use cachewire_api_types::RelayEnvelope;

const METRIC_RELAY_ROOMS: &str = "cachewire_relay_rooms";

/// Per-room fan-out channels, created on first use and dropped when the
/// last subscriber leaves.
pub struct RoomRegistry {
    rooms: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl RoomRegistry {
    /// `capacity` bounds how many undelivered messages a slow subscriber
    /// may fall behind before it starts missing them.
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Deliver `envelope` to every live subscriber of `room`.
    ///
    /// Returns the number of subscribers reached; a room nobody listens to
    /// swallows the message (staleness is bounded by the next refetch).
    pub fn publish(&self, room: &str, envelope: &RelayEnvelope) -> usize {
        let Ok(text) = serde_json::to_string(envelope) else {
            return 0;
        };
        match self.rooms.get(room) {
            Some(sender) => sender.send(text).unwrap_or(0),
            None => {
                debug!(room, "publish to room without subscribers");
                0
            }
        }
    }

    /// Join `room`, creating it on first use.
    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<String> {
        let receiver = self
            .rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        gauge!(METRIC_RELAY_ROOMS).set(self.rooms.len() as f64);
        receiver
    }

    /// Drop `room` when its last subscriber has left.
    pub fn prune(&self, room: &str) {
        self.rooms
            .remove_if(room, |_, sender| sender.receiver_count() == 0);
        gauge!(METRIC_RELAY_ROOMS).set(self.rooms.len() as f64);
    }

    /// Number of rooms currently held open.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total live subscribers across all rooms.
    pub fn subscriber_count(&self) -> usize {
        self.rooms
            .iter()
            .map(|entry| entry.value().receiver_count())
            .sum()
    }
}
