//! Shelly Meter Emulation Library
//!
//! Polls a HomeWizard P1 meter and republishes its readings as a Shelly EM / Pro 3EM,
//! over the Gen1 REST and Gen2 RPC HTTP APIs plus mDNS and CoIoT discovery.

pub mod coap;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod gen1;
pub mod gen2;
pub mod homewizard;
pub mod http_server;
pub mod identity;
pub mod meter_source;
pub mod phases;
pub mod poller;
pub mod reading;

// Re-export commonly used types for easier access
pub use config::EmulatorConfig;
pub use coordinator::EmulatorCoordinator;
pub use error::{DiscoveryError, FetchError};
pub use http_server::{create_router, AppState};
pub use identity::DeviceIdentity;
pub use meter_source::{MeterSnapshot, MeterSource, SnapshotReader};
pub use reading::UpstreamReading;
