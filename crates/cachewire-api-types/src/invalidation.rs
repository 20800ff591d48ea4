//! Invalidation messages published to the relay and the envelope it fans
//! out to subscribers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A reference to one logical cache key inside an invalidation broadcast.
///
/// The compact string form `"logical::routing"` carries the logical key
/// before the first `::` and an opaque routing suffix after it; the suffix
/// lets several physical broadcasts collapse onto one logical cache entry
/// and is discarded by subscribers. The tagged form carries the same pair
/// without delimiter collisions for logical keys that contain `::`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyRef {
    Tagged {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        routing: Option<String>,
    },
    Compact(String),
}

impl KeyRef {
    /// Build a tagged reference.
    pub fn tagged(key: impl Into<String>, routing: impl Into<String>) -> Self {
        Self::Tagged {
            key: key.into(),
            routing: Some(routing.into()),
        }
    }

    /// Build a compact (plain string) reference.
    pub fn compact(raw: impl Into<String>) -> Self {
        Self::Compact(raw.into())
    }

    /// The logical key this reference invalidates.
    ///
    /// For the compact form, everything after the first `::` is routing
    /// detail and is dropped.
    pub fn logical_key(&self) -> &str {
        match self {
            Self::Tagged { key, .. } => key,
            Self::Compact(raw) => raw.split_once("::").map_or(raw.as_str(), |(key, _)| key),
        }
    }

    /// The routing suffix, when one is present.
    pub fn routing(&self) -> Option<&str> {
        match self {
            Self::Tagged { routing, .. } => routing.as_deref(),
            Self::Compact(raw) => raw.split_once("::").map(|(_, routing)| routing),
        }
    }
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.routing() {
            Some(routing) => write!(f, "{}::{}", self.logical_key(), routing),
            None => f.write_str(self.logical_key()),
        }
    }
}

/// Content of an invalidation message: a single key, a list of keys, or an
/// arbitrary JSON object for payloads that are not key invalidations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvalidationContent {
    Many(Vec<KeyRef>),
    One(String),
    Other(serde_json::Value),
}

impl InvalidationContent {
    /// Build content from plain logical-key strings.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Many(keys.into_iter().map(|key| KeyRef::Compact(key.into())).collect())
    }
}

/// Message published to the relay ingress: which room, which keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationMessage {
    pub room: String,
    pub content: InvalidationContent,
}

/// Envelope the relay delivers to every subscriber of a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub data: InvalidationContent,
}

/// Ingress response naming how many subscribers the message reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayReceipt {
    pub room: String,
    pub delivered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_key_splits_on_first_delimiter() {
        let key = KeyRef::compact("notifications::r1");
        assert_eq!(key.logical_key(), "notifications");
        assert_eq!(key.routing(), Some("r1"));

        // only the first `::` separates logical from routing
        let nested = KeyRef::compact("a::b::c");
        assert_eq!(nested.logical_key(), "a");
        assert_eq!(nested.routing(), Some("b::c"));
    }

    #[test]
    fn plain_key_has_no_routing() {
        let key = KeyRef::compact("billing");
        assert_eq!(key.logical_key(), "billing");
        assert_eq!(key.routing(), None);
    }

    #[test]
    fn tagged_key_survives_delimiters_in_logical_key() {
        let key = KeyRef::tagged("weird::logical", "r9");
        assert_eq!(key.logical_key(), "weird::logical");
        assert_eq!(key.routing(), Some("r9"));
    }

    #[test]
    fn content_deserializes_string_array_and_object() {
        let many: InvalidationContent =
            serde_json::from_str(r#"["notifications","billing::r2"]"#).expect("array");
        match &many {
            InvalidationContent::Many(keys) => {
                assert_eq!(keys.len(), 2);
                assert_eq!(keys[1].logical_key(), "billing");
            }
            other => panic!("expected Many, got {other:?}"),
        }

        let one: InvalidationContent = serde_json::from_str(r#""notifications""#).expect("string");
        assert_eq!(one, InvalidationContent::One("notifications".to_string()));

        let other: InvalidationContent =
            serde_json::from_str(r#"{"reason":"redeploy"}"#).expect("object");
        assert!(matches!(other, InvalidationContent::Other(_)));
    }

    #[test]
    fn tagged_refs_deserialize_inside_arrays() {
        let content: InvalidationContent =
            serde_json::from_str(r#"[{"key":"notifications","routing":"r1"},"billing"]"#)
                .expect("mixed array");
        let InvalidationContent::Many(keys) = content else {
            panic!("expected Many");
        };
        assert_eq!(keys[0].logical_key(), "notifications");
        assert_eq!(keys[0].routing(), Some("r1"));
        assert_eq!(keys[1].logical_key(), "billing");
    }

    #[test]
    fn message_roundtrip() {
        let message = InvalidationMessage {
            room: "p1".to_string(),
            content: InvalidationContent::keys(["notifications", "r1"]),
        };
        let json = serde_json::to_string(&message).expect("serialize");
        let back: InvalidationMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.room, "p1");
        assert_eq!(back.content, message.content);
    }
}
