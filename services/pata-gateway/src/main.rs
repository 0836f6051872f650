use std::net::SocketAddr;
use std::sync::Arc;

use pata_config::load;
use pata_gateway::config::GatewayConfig;
use pata_gateway::{build_router, AppState, SERVICE_NAME};
use pata_obs::ObsInit;
use tokio::net::TcpListener;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn build_sha() -> &'static str {
    option_env!("BUILD_SHA").unwrap_or("unknown")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ObsInit::init(SERVICE_NAME)?;

    let config = load::<GatewayConfig>()?;
    let addr = config.socket_addr()?;
    tracing::info!(
        event = "service_start",
        service = SERVICE_NAME,
        version = VERSION,
        build_sha = build_sha(),
        listen_addr = %addr,
        "starting service"
    );

    let state = Arc::new(AppState::from_config(&config).await?);
    tracing::info!(
        access_token_name = %state.registry.access_token_field_name(),
        "authentication registry bound"
    );

    let router = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    tracing::info!(event = "service_stop", service = SERVICE_NAME);

    Ok(())
}
