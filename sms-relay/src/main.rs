use clap::Parser;
use sms_relay::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::error;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::parse();
    sms_relay::logging::init()?;

    let shutdown = CancellationToken::new();
    let app = sms_relay::app(&config, shutdown.clone())?;

    let listener = TcpListener::bind(config.listen).await?;
    info!(address = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
    shutdown.cancel();
}
