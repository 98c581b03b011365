use std::sync::{Arc, PoisonError, RwLock};

use hearth::envelope::Envelope;

use indexmap::IndexMap;

use serde::Serialize;

use tracing::{debug, warn};

/// The last known state of a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CachedState {
    /// Latest payload pushed for each action, in first-seen order.
    pub entries: IndexMap<String, String>,
    /// Message of the latest pushed error, cleared by the next successful
    /// push.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Number of pushes consumed so far.
    pub revision: u64,
}

impl CachedState {
    /// Returns the latest payload pushed for an action.
    #[must_use]
    pub fn get(&self, action: &str) -> Option<&str> {
        self.entries.get(action).map(String::as_str)
    }

    /// Checks whether nothing has been pushed yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.revision == 0
    }
}

/// A shared cache of pushed state for a single source.
///
/// Pushes are merged by action, hence a source can cache several
/// independent views, such as groups and lights. An error push is
/// recorded next to the cached data, never in place of it.
///
/// Readers get a snapshot and never wait on network I/O.
#[derive(Debug, Clone, Default)]
pub struct StateCache {
    inner: Arc<RwLock<CachedState>>,
}

impl StateCache {
    /// Creates an empty [`StateCache`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a pushed envelope into the cache.
    pub fn consume(&self, envelope: &Envelope) {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if envelope.is_error() {
            warn!(
                "Source `{}` pushed an error: {}",
                envelope.source, envelope.payload
            );
            state.last_error = Some(envelope.payload.clone());
        } else {
            debug!(
                "Caching `{}/{}`, {} bytes",
                envelope.source,
                envelope.action,
                envelope.payload.len()
            );
            let _ = state
                .entries
                .insert(envelope.action.clone(), envelope.payload.clone());
            state.last_error = None;
        }

        state.revision += 1;
    }

    /// Returns a copy of the cached state.
    #[must_use]
    pub fn snapshot(&self) -> CachedState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use hearth::envelope::Envelope;

    use super::StateCache;

    #[test]
    fn test_merge_by_action() {
        let cache = StateCache::new();
        assert!(cache.snapshot().is_empty());

        cache.consume(&Envelope::new("hue", "groups", r#"[{"id":"1"}]"#));
        cache.consume(&Envelope::new("hue", "lights", "[]"));
        cache.consume(&Envelope::new("hue", "groups", r#"[{"id":"2"}]"#));

        let state = cache.snapshot();
        assert_eq!(state.revision, 3);
        assert_eq!(state.get("groups"), Some(r#"[{"id":"2"}]"#));
        assert_eq!(state.get("lights"), Some("[]"));
        assert_eq!(
            state.entries.keys().collect::<Vec<_>>(),
            ["groups", "lights"]
        );
    }

    #[test]
    fn test_error_keeps_cached_data() {
        let cache = StateCache::new();

        cache.consume(&Envelope::new("netatmo", "devices", "[]"));
        cache.consume(&Envelope::failure("netatmo", "token expired"));

        let state = cache.snapshot();
        assert_eq!(state.get("devices"), Some("[]"));
        assert_eq!(state.last_error.as_deref(), Some("token expired"));

        cache.consume(&Envelope::new("netatmo", "devices", "[1]"));
        assert_eq!(cache.snapshot().last_error, None);
    }

    #[test]
    fn test_serialized_state() {
        let cache = StateCache::new();
        cache.consume(&Envelope::new("sonos", "groups", "[]"));

        assert_eq!(
            serde_json::to_value(cache.snapshot()).unwrap(),
            serde_json::json!({
                "entries": { "groups": "[]" },
                "revision": 1,
            })
        );
    }
}
