use docchat::{api, config, logging, service::ChatService};
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Ports tried in order when `SERVER_PORT` is unset.
const FALLBACK_PORTS: RangeInclusive<u16> = 3000..=3099;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config();
    logging::init_tracing();

    let service = ChatService::new()?;
    let app = api::create_router(Arc::new(service));

    let (listener, port) = bind_listener().await?;
    tracing::info!("Listening on http://0.0.0.0:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Bind the configured port, or scan the fallback range when none is set.
async fn bind_listener() -> std::io::Result<(TcpListener, u16)> {
    let config = config::get_config();
    if let Some(port) = config.server_port {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        return Ok((listener, port));
    }
    scan_ports(FALLBACK_PORTS).await
}

/// Bind the first free port in `range`, skipping ports already in use.
async fn scan_ports(range: RangeInclusive<u16>) -> std::io::Result<(TcpListener, u16)> {
    let describe = format!("{}-{}", range.start(), range.end());
    for port in range {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying the next one");
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        format!("no free port in {describe}"),
    ))
}
