use shelly_meter_emulation::discovery::outbound_address;
use shelly_meter_emulation::{create_router, AppState, EmulatorConfig, EmulatorCoordinator};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Shelly meter emulator");
    let mut config = EmulatorConfig::from_env();

    if config.identity.address.is_none() {
        match outbound_address().await {
            Ok(ip) => config.identity.address = Some(ip),
            Err(e) => warn!(kind = e.kind(), "could not detect outbound address: {e}"),
        }
    }
    info!(
        device = %config.identity.name,
        model = %config.identity.model,
        address = %config.identity.ip_string(),
        "emulated device"
    );

    let coordinator = EmulatorCoordinator::start(&config)?;

    let state = AppState::new(
        coordinator.snapshot(),
        Arc::new(config.identity.clone()),
        config.single_phase_emulation,
    );
    let app = create_router(state, config.enable_gen1, config.enable_gen2);

    let socket_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.listen_port));
    info!("Starting up server on {socket_addr}");
    let listener = TcpListener::bind(socket_addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
        })
        .await;

    coordinator.shutdown().await;
    served?;
    info!("stopped");
    Ok(())
}
