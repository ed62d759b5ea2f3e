use crate::error::FetchError;
use crate::meter_source::MeterSource;
use crate::reading::UpstreamReading;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Background loop feeding the snapshot from the HomeWizard meter
pub struct Poller {
    source: MeterSource,
    interval: Duration,
}

impl Poller {
    pub fn new(source: MeterSource, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Fetch, then sleep for the interval, until shutdown is signalled.
    /// A slow fetch pushes the next attempt back rather than overlapping it.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            url = self.source.endpoint_url(),
            interval_ms = self.interval.as_millis() as u64,
            "starting HomeWizard poller"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                result = self.source.fetch() => result,
                _ = shutdown.changed() => break,
            };
            self.log_result(result);

            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("HomeWizard poller stopped");
    }

    fn log_result(&self, result: Result<UpstreamReading, FetchError>) {
        match result {
            Ok(reading) => {
                debug!(
                    power_w = reading.total_active_power_w,
                    import_kwh = reading.total_import_kwh,
                    export_kwh = reading.total_export_kwh,
                    "fetched HomeWizard reading"
                );
            }
            Err(e) => {
                let snapshot = self.source.snapshot();
                warn!(
                    kind = e.kind(),
                    consecutive_failures = snapshot.consecutive_failures,
                    stale = snapshot.is_stale,
                    "HomeWizard poll failed: {e}"
                );
            }
        }
    }
}
