use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use relay_limit::TokenBucket;
use tower_relay::DeadlinePolicy;
use tower_relay::DispatchLayer;

use crate::messagebird::Options;

/// Longest value accepted for any timing setting.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

fn parse_duration(value: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(value).map_err(|err| err.to_string())?;
    if duration > MAX_DURATION {
        return Err(format!(
            "must not exceed {}",
            humantime::format_duration(MAX_DURATION)
        ));
    }
    Ok(duration)
}

/// Relay SMS requests to MessageBird at a bounded rate.
#[derive(Debug, Clone, Parser)]
#[command(name = "sms-relay", version, about)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "RELAY_LISTEN", default_value = "0.0.0.0:3500")]
    pub listen: SocketAddr,

    /// Requests allowed to wait for dispatch before new ones are refused.
    #[arg(long, env = "RELAY_BUFFER", default_value = "10")]
    pub buffer: NonZeroUsize,

    /// Time budget of a single request, from admission to answer.
    #[arg(long, env = "RELAY_REQUEST_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    /// Minimum spacing between two provider calls.
    #[arg(long, env = "RELAY_THROTTLE_RATE", default_value = "1s", value_parser = parse_duration)]
    pub throttle_rate: Duration,

    /// Releases that may build up while the queue is idle.
    #[arg(long, env = "RELAY_BURST", default_value = "1")]
    pub burst: NonZeroUsize,

    /// Cancel provider calls still running at their deadline.
    #[arg(long, env = "RELAY_ABORT_ON_DEADLINE")]
    pub abort_on_deadline: bool,

    /// MessageBird access key. Without one every request fails.
    #[arg(long, env = "MESSAGE_BIRD_ACCESSKEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// MessageBird base URL.
    #[arg(long, env = "MESSAGE_BIRD_URL")]
    pub provider_url: Option<String>,

    /// Transport timeout of a single MessageBird call.
    #[arg(long, env = "MESSAGE_BIRD_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub provider_timeout: Duration,
}

impl Config {
    pub fn deadline_policy(&self) -> DeadlinePolicy {
        if self.abort_on_deadline {
            DeadlinePolicy::Abort
        } else {
            DeadlinePolicy::Detach
        }
    }

    /// `None` when no access key is configured.
    pub fn provider_options(&self) -> Option<Options> {
        let access_key = self.access_key.clone().filter(|key| !key.is_empty())?;
        Some(Options {
            access_key,
            base_url: self.provider_url.clone(),
            timeout: self.provider_timeout,
        })
    }

    pub fn dispatch_layer(&self) -> DispatchLayer<TokenBucket> {
        let pacer = Arc::new(TokenBucket::pacer(self.throttle_rate, self.burst));
        DispatchLayer::new(pacer, self.buffer, self.request_timeout)
            .with_deadline_policy(self.deadline_policy())
    }
}
