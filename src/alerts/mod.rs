use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

pub mod channel;
pub mod console;
pub mod email;

pub use channel::{ChannelAck, ChannelError, NotificationChannel};
pub use console::ConsoleChannel;
pub use email::{EmailChannel, SmtpConfig};

use crate::models::{AlertEvent, AlertKind, PriceObservation, ProductConfig};

/// Outcome of offering one event to one channel.
#[derive(Debug, Clone)]
pub struct ChannelOutcome {
    pub channel: String,
    pub result: Result<ChannelAck, ChannelError>,
}

/// Per-channel delivery report for one alert event. One broken channel
/// never suppresses the others, so the report can mix successes and
/// failures.
#[derive(Debug, Clone)]
pub struct AlertResult {
    pub kind: AlertKind,
    pub outcomes: Vec<ChannelOutcome>,
}

impl AlertResult {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

/// Fans alert events out to every registered channel, isolating per-channel
/// failures. Stateless per call: repeated threshold crossings across runs
/// each produce a fresh alert, and suppression policy is left to channels
/// or an outer layer.
pub struct AlertDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Compare an observation against the product target and, on a
    /// crossing, deliver a `PriceTargetReached` event. Returns `None` when
    /// no alert condition holds.
    pub async fn dispatch(
        &self,
        product: &ProductConfig,
        observation: &PriceObservation,
    ) -> Option<AlertResult> {
        if !observation.target_reached() {
            return None;
        }

        let event = AlertEvent {
            kind: AlertKind::PriceTargetReached,
            product: product.clone(),
            observation: observation.clone(),
        };
        info!(
            product = product.name.as_str(),
            price = %observation.price.unwrap_or_default(),
            target = %observation.target_price,
            "price target reached"
        );
        Some(self.fan_out(event).await)
    }

    /// Deliver a `SystemDegraded` event. Raised by the monitor when a
    /// product keeps failing, not by price comparison.
    pub async fn raise_degraded(
        &self,
        product: &ProductConfig,
        observation: &PriceObservation,
        consecutive_failures: u32,
    ) -> AlertResult {
        warn!(
            product = product.name.as_str(),
            consecutive_failures, "product monitoring degraded"
        );
        let event = AlertEvent {
            kind: AlertKind::SystemDegraded,
            product: product.clone(),
            observation: observation.clone(),
        };
        self.fan_out(event).await
    }

    /// Offer the event to all channels at once. Outcomes come back in
    /// registration order regardless of which delivery finishes first.
    async fn fan_out(&self, event: AlertEvent) -> AlertResult {
        let sends = self.channels.iter().map(|channel| {
            let event = &event;
            async move {
                let result = channel.send(event).await;
                if let Err(err) = &result {
                    warn!(
                        channel = channel.name(),
                        error = %err,
                        "alert delivery failed"
                    );
                }
                ChannelOutcome {
                    channel: channel.name().to_string(),
                    result,
                }
            }
        });
        let outcomes = join_all(sends).await;

        AlertResult {
            kind: event.kind,
            outcomes,
        }
    }
}
