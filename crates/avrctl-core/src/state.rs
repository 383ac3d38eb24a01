//! Cached receiver state and the sink that state updates merge into.
//!
//! The receiver pushes a line for every change made on the front panel,
//! remote or another client, so the cache is normally current without
//! polling. The connection reads it through the [`StateSink`] trait, which
//! reports whether a merge actually changed anything so unchanged echoes do
//! not produce events.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::types::CommandValue;

/// One `attribute = value` update produced by a parsed line.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    /// Attribute key (`power`, `PS_DELAY`).
    pub attribute: String,
    /// Decoded value, or `None` when the line carried none.
    pub value: Option<CommandValue>,
}

/// Destination for state updates.
pub trait StateSink: Send + Sync {
    /// Merge an update; return `true` if the stored value changed.
    fn merge(&self, update: &StateUpdate) -> bool;
}

/// In-memory attribute map with change detection.
///
/// Safe to share between the connection's reader task and application code.
#[derive(Debug, Default)]
pub struct DeviceState {
    attributes: RwLock<HashMap<String, Option<CommandValue>>>,
}

impl DeviceState {
    /// An empty state cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of an attribute. `None` if never seen; `Some(None)` if
    /// the receiver reported it without a value.
    pub fn get(&self, attribute: &str) -> Option<Option<CommandValue>> {
        let attrs = self
            .attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        attrs.get(attribute).cloned()
    }

    /// Copy of every known attribute.
    pub fn snapshot(&self) -> HashMap<String, Option<CommandValue>> {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of known attributes.
    pub fn len(&self) -> usize {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything, e.g. after a reconnect.
    pub fn clear(&self) {
        self.attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl StateSink for DeviceState {
    fn merge(&self, update: &StateUpdate) -> bool {
        let mut attrs = self
            .attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match attrs.get(&update.attribute) {
            Some(current) if *current == update.value => false,
            _ => {
                attrs.insert(update.attribute.clone(), update.value.clone());
                true
            }
        }
    }
}
