use std::net::SocketAddr;

use tokio::net::TcpListener;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json")) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

// Binds every interface so the server is reachable from outside a container.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    init_runtime();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(3000);
    let address = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(address).await.inspect_err(|e| {
        tracing::error!(%address, error = %e, "failed to bind");
    })?;
    tracing::info!(%address, "listening");
    mock_server::run(listener).await
}
