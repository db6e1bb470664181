use std::sync::RwLock;

use async_trait::async_trait;

use crate::analytics::EventStore;
use crate::error::StoreError;
use crate::event::Event;
use crate::range::TimeRange;

/// Event store kept entirely in memory. Used by tests and local demos.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventStore {
    pub fn new(events: Vec<Event>) -> Self {
        let store = Self::default();
        store.extend(events);
        store
    }

    pub fn extend(&self, events: impl IntoIterator<Item = Event>) {
        let mut guard = match self.events.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.extend(events);
        guard.sort_by_key(|e| e.timestamp);
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|g| g.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn fetch_events(&self, range: &TimeRange) -> Result<Vec<Event>, StoreError> {
        let guard = self
            .events
            .read()
            .map_err(|_| StoreError::msg("memory store lock poisoned"))?;
        Ok(guard
            .iter()
            .filter(|e| e.timestamp.is_some_and(|ts| range.contains(ts)))
            .cloned()
            .collect())
    }
}
