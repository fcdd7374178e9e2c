//! Sources of unique suffixes for experiment names.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Produces identifiers that are unique within the lifetime of the source.
pub trait IdSource: Debug + Send {
    /// Returns the next identifier.
    fn next_id(&mut self) -> String;
}

/// Sequential identifiers, starting at `1`, with an optional prefix.
///
/// Deterministic, and thus the preferred source for tests.
#[derive(Debug, Default)]
pub struct CounterIds {
    prefix: String,
    last: u64,
}

impl CounterIds {
    /// Creates a counter whose identifiers all start with the given prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            last: 0,
        }
    }
}

impl IdSource for CounterIds {
    fn next_id(&mut self) -> String {
        self.last += 1;
        format!("{}{}", self.prefix, self.last)
    }
}

/// Random UUIDv4 identifiers in their simple (dashless) form.
#[derive(Debug, Default)]
pub struct UuidIds;

impl IdSource for UuidIds {
    fn next_id(&mut self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Selects an [`IdSource`] from configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    /// [`UuidIds`], unique across users and processes.
    #[default]
    Uuid,
    /// [`CounterIds`] prefixed with the name of the virtual user.
    Counter,
}

impl IdKind {
    /// Creates the configured source for the given virtual user.
    pub fn source(self, user: &str) -> Box<dyn IdSource> {
        match self {
            IdKind::Uuid => Box::new(UuidIds),
            IdKind::Counter => Box::new(CounterIds::with_prefix(format!("{user}-"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_sequential() {
        let mut ids = CounterIds::default();
        assert_eq!(ids.next_id(), "1");
        assert_eq!(ids.next_id(), "2");

        let mut ids = IdKind::Counter.source("user-3");
        assert_eq!(ids.next_id(), "user-3-1");
    }

    #[test]
    fn uuids_differ() {
        let mut ids = UuidIds;
        let first = ids.next_id();
        assert_eq!(first.len(), 32);
        assert_ne!(first, ids.next_id());
    }
}
