use crate::config::EmulatorConfig;
use crate::discovery::{DiscoveryAnnouncer, MdnsRegistrar, UdpMulticast};
use crate::homewizard::HomeWizardClient;
use crate::identity::DeviceIdentity;
use crate::meter_source::{MeterSource, SnapshotReader};
use crate::poller::Poller;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

/// How long each task gets to finish after the shutdown signal
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Starts and stops the background tasks: poller, mDNS advertisement and CoIoT announce
pub struct EmulatorCoordinator {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    snapshot: SnapshotReader,
}

impl EmulatorCoordinator {
    /// Spawns every enabled task and returns once they are running
    pub fn start(config: &EmulatorConfig) -> anyhow::Result<Self> {
        info!("Initializing emulator coordinator");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let upstream = &config.upstream;

        let client = HomeWizardClient::new(&upstream.base_url(), &upstream.endpoint, upstream.timeout)?;
        let (source, snapshot) = MeterSource::new(client, upstream.stale_after_failures);
        info!(
            url = source.endpoint_url(),
            poll_interval_secs = upstream.poll_interval.as_secs_f64(),
            "polling HomeWizard"
        );

        let mut tasks = Vec::new();
        let poller = Poller::new(source, upstream.poll_interval);
        let rx = shutdown_rx.clone();
        tasks.push(("poller", tokio::spawn(async move { poller.run(rx).await })));

        if config.enable_mdns || config.enable_coap {
            let identity = Arc::new(config.identity.clone());
            let address = advertised_address(&identity);
            let announcer = Arc::new(DiscoveryAnnouncer::new(
                identity,
                address,
                config.announce_interval,
            ));

            if config.enable_mdns {
                let announcer = announcer.clone();
                let rx = shutdown_rx.clone();
                tasks.push((
                    "mdns",
                    tokio::spawn(async move {
                        announcer
                            .run_service_advertisement(MdnsRegistrar::default(), rx)
                            .await
                    }),
                ));
            }

            if config.enable_coap {
                let rx = shutdown_rx.clone();
                tasks.push((
                    "coiot",
                    tokio::spawn(async move {
                        match UdpMulticast::coiot().await {
                            Ok(transport) => announcer.run_announce(transport, rx).await,
                            Err(e) => {
                                warn!(kind = e.kind(), "CoIoT socket unavailable, announce disabled: {e}")
                            }
                        }
                    }),
                ));
            }
        }

        info!(tasks = tasks.len(), "all background tasks started");
        Ok(Self {
            shutdown_tx,
            tasks,
            snapshot,
        })
    }

    pub fn snapshot(&self) -> SnapshotReader {
        self.snapshot.clone()
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Signals every task, waits up to `DRAIN_TIMEOUT` for each, then aborts what is left
    pub async fn shutdown(self) {
        self.shutdown_tx.send_replace(true);
        for (name, mut handle) in self.tasks {
            match timeout(DRAIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => info!(task = name, "task stopped"),
                Ok(Err(e)) => warn!(task = name, "task ended abnormally: {e}"),
                Err(_) => {
                    warn!(task = name, "task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
    }
}

fn advertised_address(identity: &DeviceIdentity) -> IpAddr {
    identity
        .address
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
