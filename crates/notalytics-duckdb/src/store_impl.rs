use async_trait::async_trait;

use notalytics_core::analytics::EventStore;
use notalytics_core::error::StoreError;
use notalytics_core::event::Event;
use notalytics_core::range::TimeRange;

use crate::DuckDbBackend;

#[async_trait]
impl EventStore for DuckDbBackend {
    async fn fetch_events(&self, range: &TimeRange) -> Result<Vec<Event>, StoreError> {
        crate::queries::events::fetch_events_inner(self, range)
            .await
            .map_err(StoreError::from)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        DuckDbBackend::ping(self).await.map_err(StoreError::from)
    }
}
