//! Change notification hub for snapshot listeners
//!
//! Writers call [`SnapshotHub::notify`] after a successful mutation.
//! Notifications for a collection are debounced: the first change in a
//! window schedules one broadcast at the end of the window and later
//! changes inside it ride along. Listeners re-read after the broadcast,
//! so the final state of a burst is always delivered.

use super::markers::ProcessingMarkers;
use crate::config::SNAPSHOT_CHANNEL_CAPACITY;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct SnapshotHub {
    channels: Arc<DashMap<String, broadcast::Sender<()>>>,
    markers: Arc<ProcessingMarkers>,
}

impl SnapshotHub {
    pub fn new(debounce: Duration) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            markers: Arc::new(ProcessingMarkers::new(debounce)),
        }
    }

    /// Subscribe to change notifications for a collection
    pub fn changes(&self, collection: &str) -> broadcast::Receiver<()> {
        self.channels
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Record that a collection changed
    pub fn notify(&self, collection: &str) {
        let Some(sender) = self.channels.get(collection).map(|s| s.value().clone()) else {
            return;
        };
        if sender.receiver_count() == 0 {
            return;
        }
        if !self.markers.try_mark(collection) {
            return;
        }

        let markers = self.markers.clone();
        let key = collection.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(markers.window()).await;
            markers.clear(&key);
            // Listeners may all have gone away meanwhile
            let _ = sender.send(());
        });
    }
}
