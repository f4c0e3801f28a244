//! Call-scoped identity table for reference-mode members.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

/// A shared instance as stored in the tracker.
pub type SharedValue = Arc<dyn Any + Send + Sync>;

/// Maps `(type, key)` to the instance read under that key.
///
/// One tracker lives for exactly one read or write call. Remembering a key
/// twice replaces the earlier instance; the previous one is returned so the
/// replacement is observable.
#[derive(Default)]
pub struct ReferenceTracker {
    entries: HashMap<(TypeId, String), SharedValue>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `instance` under `key`, returning the instance it replaced.
    pub fn remember(
        &mut self,
        type_id: TypeId,
        key: impl Into<String>,
        instance: SharedValue,
    ) -> Option<SharedValue> {
        let key = key.into();
        trace!(key = %key, "remembering shared instance");
        self.entries.insert((type_id, key), instance)
    }

    /// Looks up the instance remembered under `key`.
    pub fn resolve(&self, type_id: TypeId, key: &str) -> Option<SharedValue> {
        self.entries.get(&(type_id, key.to_string())).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ReferenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceTracker")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Joins identity parts into the wire form: the part itself, or `(a,b)`.
pub fn composite_key(parts: &[String]) -> String {
    match parts {
        [single] => single.clone(),
        parts => format!("({})", parts.join(",")),
    }
}
