//! Change watcher: notices when a new report has been published
//!
//! Polls the report's modification marker so the scan loop and the gateway
//! can live in different processes. Only a strictly newer marker counts as a
//! change; an equal, older or unreadable marker is ignored.

use crate::store::ReportStore;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Emitted once per observed publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Marker of the report that triggered the event
    pub marker: SystemTime,
}

/// Polling detector for report replacements
#[derive(Debug)]
pub struct ChangeWatcher {
    store: ReportStore,
    poll_interval: Duration,
    last: Option<SystemTime>,
}

impl ChangeWatcher {
    /// Creates a watcher seeded with the marker present right now, so an
    /// existing report does not count as a change
    pub fn new(store: ReportStore, poll_interval: Duration) -> Self {
        let last = store.marker();
        Self {
            store,
            poll_interval,
            last,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Feeds one observed marker; returns an event if it strictly advanced
    pub fn observe(&mut self, marker: Option<SystemTime>) -> Option<ChangeEvent> {
        let current = marker?;
        match self.last {
            Some(last) if current <= last => None,
            _ => {
                self.last = Some(current);
                Some(ChangeEvent { marker: current })
            }
        }
    }

    /// Checks the store once
    pub fn poll(&mut self) -> Option<ChangeEvent> {
        let marker = self.store.marker();
        self.observe(marker)
    }

    /// Polls forever, sending one event per change. Stops when the receiver
    /// is dropped.
    pub async fn run(mut self, events: mpsc::Sender<ChangeEvent>) {
        info!(
            "Watching {} every {}ms",
            self.store.path().display(),
            self.poll_interval.as_millis()
        );
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Some(event) = self.poll() {
                debug!("Report marker advanced to {:?}", event.marker);
                if events.send(event).await.is_err() {
                    debug!("Change receiver dropped, watcher exiting");
                    return;
                }
            }
        }
    }
}
