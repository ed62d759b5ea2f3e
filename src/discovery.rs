use crate::coap::{coiot_destination, CoapMessage};
use crate::error::DiscoveryError;
use crate::identity::DeviceIdentity;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Service types a Shelly registers on the LAN
pub const SERVICE_TYPES: [&str; 2] = ["_http._tcp.local.", "_shelly._tcp.local."];

/// What gets published through service discovery
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAdvert {
    pub instance_name: String,
    pub hostname: String,
    pub address: IpAddr,
    pub port: u16,
    pub txt: HashMap<String, String>,
}

impl ServiceAdvert {
    pub fn new(identity: &DeviceIdentity, address: IpAddr) -> Self {
        let txt = HashMap::from([
            ("gen".to_string(), "2".to_string()),
            ("app".to_string(), identity.app.clone()),
            ("ver".to_string(), identity.firmware.clone()),
            ("id".to_string(), identity.device_id()),
        ]);
        Self {
            instance_name: identity.name.clone(),
            hostname: format!("{}.local.", identity.hostname),
            address,
            port: identity.port,
            txt,
        }
    }
}

/// Registration with the local service discovery mechanism
pub trait ServiceRegistrar: Send {
    fn register(&mut self, advert: &ServiceAdvert) -> Result<(), DiscoveryError>;
    fn unregister(&mut self) -> Result<(), DiscoveryError>;
}

/// mDNS responder backed by `mdns-sd`, which answers queries from its own thread
#[derive(Default)]
pub struct MdnsRegistrar {
    daemon: Option<ServiceDaemon>,
    fullnames: Vec<String>,
}

impl ServiceRegistrar for MdnsRegistrar {
    fn register(&mut self, advert: &ServiceAdvert) -> Result<(), DiscoveryError> {
        let daemon = ServiceDaemon::new()?;
        for service_type in SERVICE_TYPES {
            let info = ServiceInfo::new(
                service_type,
                &advert.instance_name,
                &advert.hostname,
                advert.address,
                advert.port,
                advert.txt.clone(),
            )?;
            self.fullnames.push(info.get_fullname().to_string());
            daemon.register(info)?;
        }
        self.daemon = Some(daemon);
        Ok(())
    }

    fn unregister(&mut self) -> Result<(), DiscoveryError> {
        if let Some(daemon) = self.daemon.take() {
            for fullname in self.fullnames.drain(..) {
                daemon.unregister(&fullname)?;
            }
            daemon.shutdown()?;
        }
        Ok(())
    }
}

/// Connectionless sender for announce packets. A send never waits for a reply.
pub trait AnnounceTransport: Send + Sync + 'static {
    fn send(&self, packet: &[u8]) -> impl Future<Output = Result<(), DiscoveryError>> + Send;
}

pub struct UdpMulticast {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpMulticast {
    pub async fn bind(destination: SocketAddrV4) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| DiscoveryError::AnnounceSendFailed(e.to_string()))?;
        socket
            .set_multicast_ttl_v4(1)
            .map_err(|e| DiscoveryError::AnnounceSendFailed(e.to_string()))?;
        Ok(Self {
            socket,
            destination: SocketAddr::V4(destination),
        })
    }

    pub async fn coiot() -> Result<Self, DiscoveryError> {
        Self::bind(coiot_destination()).await
    }
}

impl AnnounceTransport for UdpMulticast {
    async fn send(&self, packet: &[u8]) -> Result<(), DiscoveryError> {
        self.socket
            .send_to(packet, self.destination)
            .await
            .map(|_| ())
            .map_err(|e| DiscoveryError::AnnounceSendFailed(e.to_string()))
    }
}

/// Local address of the interface that routes outwards. Connecting a UDP socket sends nothing.
pub async fn outbound_address() -> Result<IpAddr, DiscoveryError> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(|e| DiscoveryError::RegistrationFailed(e.to_string()))?;
    socket
        .connect(SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 80))
        .await
        .map_err(|e| DiscoveryError::RegistrationFailed(e.to_string()))?;
    let local = socket
        .local_addr()
        .map_err(|e| DiscoveryError::RegistrationFailed(e.to_string()))?;
    Ok(local.ip())
}

/// Presence on the LAN. Works from the static identity only, never from meter data.
pub struct DiscoveryAnnouncer {
    identity: Arc<DeviceIdentity>,
    address: IpAddr,
    announce_interval: Duration,
}

impl DiscoveryAnnouncer {
    pub fn new(identity: Arc<DeviceIdentity>, address: IpAddr, announce_interval: Duration) -> Self {
        Self {
            identity,
            address,
            announce_interval,
        }
    }

    /// Registers once, stays registered until shutdown. Failure is logged and otherwise ignored.
    pub async fn run_service_advertisement<R: ServiceRegistrar>(
        &self,
        mut registrar: R,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let advert = ServiceAdvert::new(&self.identity, self.address);
        let registered = if advert.address.is_unspecified() {
            warn!("no routable address known, skipping mDNS registration (set ADVERTISE_IP)");
            false
        } else {
            self.register(&mut registrar, &advert)
        };

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        if registered {
            if let Err(e) = registrar.unregister() {
                warn!(kind = e.kind(), "mDNS unregister failed: {e}");
            }
        }
        info!("service advertisement stopped");
    }

    fn register<R: ServiceRegistrar>(&self, registrar: &mut R, advert: &ServiceAdvert) -> bool {
        match registrar.register(advert) {
            Ok(()) => {
                info!(
                    host = %advert.hostname,
                    address = %advert.address,
                    port = advert.port,
                    "registered mDNS service"
                );
                true
            }
            Err(e) => {
                warn!(kind = e.kind(), "mDNS registration failed, continuing without it: {e}");
                false
            }
        }
    }

    pub fn global_device_id(&self) -> String {
        format!("{}#{}#2", self.identity.model, self.identity.mac)
    }

    pub fn announce_packet(&self, message_id: u16) -> Vec<u8> {
        let payload = json!({
            "id": self.identity.device_id(),
            "name": self.identity.name,
            "model": self.identity.model,
            "mac": self.identity.mac,
            "fw": self.identity.firmware,
            "ip": self.address.to_string(),
            "port": self.identity.port,
        });
        let validity = (self.announce_interval.as_secs() * 2).min(u16::MAX as u64) as u16;
        CoapMessage::coiot_announce(
            message_id,
            &self.global_device_id(),
            validity,
            message_id,
            payload.to_string().into_bytes(),
        )
        .encode()
    }

    /// Sends an announce on every tick; a failed send waits for the next tick
    pub async fn run_announce<T: AnnounceTransport>(
        &self,
        transport: T,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            interval_secs = self.announce_interval.as_secs_f64(),
            "starting CoIoT announce"
        );
        let mut ticker = interval(self.announce_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut message_id: u16 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            message_id = message_id.wrapping_add(1);
            let packet = self.announce_packet(message_id);
            match transport.send(&packet).await {
                Ok(()) => debug!(message_id, bytes = packet.len(), "sent CoIoT announce"),
                Err(e) => warn!(kind = e.kind(), "CoIoT announce failed: {e}"),
            }
        }
        info!("CoIoT announce stopped");
    }
}
