//! Store key composition.
//!
//! A `StoreKey` is an ordered sequence of non-empty string segments joined
//! with `:`. Empty segments are dropped before joining; two keys are equal
//! iff their joined strings are equal.

use std::fmt;

/// A composed key addressing one value in the shared key-value backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey(String);

impl StoreKey {
    /// Compose a key from segments, dropping empty ones.
    pub fn compose<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments
            .into_iter()
            .filter(|segment| !segment.as_ref().is_empty())
            .map(|segment| segment.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(":");
        Self(joined)
    }

    /// Append a trailing unique segment, yielding `<key>:<unique>`.
    ///
    /// An empty unique segment leaves the key unchanged.
    pub fn with_unique(self, unique: &str) -> Self {
        if unique.is_empty() {
            return self;
        }
        if self.0.is_empty() {
            return Self(unique.to_string());
        }
        Self(format!("{}:{unique}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<StoreKey> for String {
    fn from(key: StoreKey) -> Self {
        key.0
    }
}

/// Key of a project's notification list.
pub fn notifications_key(project_id: &str) -> StoreKey {
    StoreKey::compose(["notifications", project_id])
}
