//! # SMS Relay
//!
//! An HTTP front end that accepts SMS submissions, validates them and relays
//! them to MessageBird through a [`tower_relay::DispatchService`], so the
//! provider is called at most once per throttle interval no matter how many
//! clients are waiting.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod messagebird;
pub mod validation;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower::util::BoxCloneSyncService;
use tower_relay::ProviderService;
use tracing::info;
use tracing::warn;

pub use api::ApiResponse;
pub use api::MessageData;
pub use config::Config;
pub use error::ApiError;
pub use messagebird::MessageBirdClient;
pub use messagebird::MessageBirdError;
pub use validation::Submission;
pub use validation::ValidationError;

/// Builds the provider named by `config`, if any.
pub fn provider(config: &Config) -> Result<Option<ProviderService>, MessageBirdError> {
    let Some(options) = config.provider_options() else {
        warn!("no MessageBird access key configured, every message will fail");
        return Ok(None);
    };

    let client = MessageBirdClient::new(options)?;
    Ok(Some(BoxCloneSyncService::new(client)))
}

/// Spawns the dispatcher and returns the router serving it.
///
/// Must be called from within a tokio runtime. Cancelling `shutdown` stops
/// the dispatcher and refuses further submissions.
pub fn app(config: &Config, shutdown: CancellationToken) -> Result<Router, MessageBirdError> {
    let provider = provider(config)?;
    info!(
        buffer = config.buffer.get(),
        request_timeout = ?config.request_timeout,
        throttle_rate = ?config.throttle_rate,
        burst = config.burst.get(),
        policy = ?config.deadline_policy(),
        "starting dispatcher"
    );

    let dispatch = config.dispatch_layer().with_shutdown(shutdown).spawn(provider);
    Ok(api::router(dispatch))
}
