use crate::error::FetchError;
use crate::homewizard::HomeWizardClient;
use crate::reading::UpstreamReading;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// Marker exposed on the wire so controllers can tell cached data from live data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// Nothing has been read from the gateway yet
    Init,
    Live,
    /// Serving the last good reading while the gateway keeps failing
    Stale,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Init => "init",
            SnapshotStatus::Live => "live",
            SnapshotStatus::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeterSnapshot {
    pub latest: Option<UpstreamReading>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
    pub consecutive_failures: u32,
}

impl MeterSnapshot {
    pub fn initial() -> Self {
        Self {
            latest: None,
            fetched_at: None,
            is_stale: true,
            consecutive_failures: 0,
        }
    }

    pub fn reading(&self) -> Option<&UpstreamReading> {
        self.latest.as_ref()
    }

    pub fn status(&self) -> SnapshotStatus {
        match (&self.latest, self.is_stale) {
            (None, _) => SnapshotStatus::Init,
            (Some(_), false) => SnapshotStatus::Live,
            (Some(_), true) => SnapshotStatus::Stale,
        }
    }

    fn after_success(reading: UpstreamReading, fetched_at: DateTime<Utc>) -> Self {
        Self {
            latest: Some(reading),
            fetched_at: Some(fetched_at),
            is_stale: false,
            consecutive_failures: 0,
        }
    }

    /// The previous reading is always kept; it only turns stale after `stale_after` failures in a row
    fn after_failure(&self, stale_after: u32) -> Self {
        let consecutive_failures = self.consecutive_failures.saturating_add(1);
        Self {
            latest: self.latest.clone(),
            fetched_at: self.fetched_at,
            is_stale: self.latest.is_none() || consecutive_failures >= stale_after,
            consecutive_failures,
        }
    }
}

impl Default for MeterSnapshot {
    fn default() -> Self {
        Self::initial()
    }
}

/// Creates the snapshot cell. The writer is unique, readers can be cloned freely.
pub fn snapshot_cell() -> (SnapshotWriter, SnapshotReader) {
    let (tx, rx) = watch::channel(Arc::new(MeterSnapshot::initial()));
    (SnapshotWriter { tx }, SnapshotReader { rx })
}

/// Exclusive write handle. Replacing the snapshot swaps a whole `Arc`, so readers
/// see either the old or the new value.
pub struct SnapshotWriter {
    tx: watch::Sender<Arc<MeterSnapshot>>,
}

impl SnapshotWriter {
    pub fn replace(&mut self, snapshot: MeterSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    pub fn current(&self) -> Arc<MeterSnapshot> {
        self.tx.borrow().clone()
    }
}

/// Shared read-only view of the snapshot
#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Arc<MeterSnapshot>>,
}

impl SnapshotReader {
    pub fn current(&self) -> Arc<MeterSnapshot> {
        self.rx.borrow().clone()
    }

    /// Waits for the next replacement, false once the writer is gone
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Owns the upstream client and the write side of the snapshot
pub struct MeterSource {
    client: HomeWizardClient,
    writer: SnapshotWriter,
    stale_after_failures: u32,
}

impl MeterSource {
    pub fn new(client: HomeWizardClient, stale_after_failures: u32) -> (Self, SnapshotReader) {
        let (writer, reader) = snapshot_cell();
        (
            Self {
                client,
                writer,
                stale_after_failures,
            },
            reader,
        )
    }

    pub fn endpoint_url(&self) -> &str {
        self.client.endpoint_url()
    }

    /// One poll attempt. The snapshot is updated either way, but a failure never drops the last reading.
    pub async fn fetch(&mut self) -> Result<UpstreamReading, FetchError> {
        match self.client.read_data().await {
            Ok(data) => {
                let reading = data.into_reading();
                self.writer
                    .replace(MeterSnapshot::after_success(reading.clone(), Utc::now()));
                Ok(reading)
            }
            Err(e) => {
                let next = self.writer.current().after_failure(self.stale_after_failures);
                self.writer.replace(next);
                Err(e)
            }
        }
    }

    pub fn snapshot(&self) -> Arc<MeterSnapshot> {
        self.writer.current()
    }
}
