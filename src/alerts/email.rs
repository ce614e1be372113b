use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

use super::channel::{ChannelAck, ChannelError, NotificationChannel};
use super::console::{format_alert, format_price};
use crate::models::{AlertEvent, AlertKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub use_tls: bool,
}

/// SMTP delivery via lettre. Built only when the deployment enables email.
#[derive(Debug)]
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: lettre::message::Mailbox,
    to: lettre::message::Mailbox,
}

impl EmailChannel {
    pub fn new(config: &SmtpConfig) -> Result<Self, ChannelError> {
        let from = config
            .from_address
            .as_deref()
            .ok_or_else(|| ChannelError::Misconfigured("missing from_address".to_string()))?
            .parse()
            .map_err(|e| ChannelError::Misconfigured(format!("invalid from_address: {e}")))?;
        let to = config
            .to_address
            .as_deref()
            .ok_or_else(|| ChannelError::Misconfigured("missing to_address".to_string()))?
            .parse()
            .map_err(|e| ChannelError::Misconfigured(format!("invalid to_address: {e}")))?;

        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| ChannelError::Misconfigured(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn subject(event: &AlertEvent) -> String {
        match event.kind {
            AlertKind::PriceTargetReached => {
                let price = event.observation.price.unwrap_or_default();
                format!(
                    "Alerta de preco: {} por {}",
                    event.product.name,
                    format_price(price)
                )
            }
            AlertKind::SystemDegraded => {
                format!("Monitoramento degradado: {}", event.product.name)
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, event: &AlertEvent) -> Result<ChannelAck, ChannelError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(Self::subject(event))
            .header(ContentType::TEXT_PLAIN)
            .body(format_alert(event))
            .map_err(|e| ChannelError::SendFailed(format!("failed to build message: {e}")))?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        Ok(ChannelAck {
            channel: self.name().to_string(),
            message_id: response.message().next().map(|m| m.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PriceObservation, ProductConfig};
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: None,
            password: None,
            from_address: Some("vigia@example.com".to_string()),
            to_address: Some("alerts@example.com".to_string()),
            use_tls: false,
        }
    }

    #[test]
    fn test_channel_requires_addresses() {
        let mut config = smtp_config();
        config.from_address = None;
        let err = EmailChannel::new(&config).unwrap_err();
        assert!(matches!(err, ChannelError::Misconfigured(_)));

        let mut config = smtp_config();
        config.to_address = Some("not an address".to_string());
        let err = EmailChannel::new(&config).unwrap_err();
        assert!(matches!(err, ChannelError::Misconfigured(_)));
    }

    #[test]
    fn test_subject_mentions_product_and_price() {
        let product = ProductConfig::new("Cafeteira", "https://example.com/c", dec("500.00"));
        let observation = PriceObservation::ok(
            product.name.clone(),
            product.url.clone(),
            dec("450.00"),
            product.target_price,
        )
        .unwrap();
        let event = AlertEvent {
            kind: AlertKind::PriceTargetReached,
            product,
            observation,
        };
        let subject = EmailChannel::subject(&event);
        assert!(subject.contains("Cafeteira"));
        assert!(subject.contains("R$ 450,00"));
    }

    #[tokio::test]
    async fn test_send_to_unreachable_relay_is_send_failed() {
        let channel = EmailChannel::new(&smtp_config()).unwrap();
        let product = ProductConfig::new("Widget", "https://example.com/w", dec("10.00"));
        let observation = PriceObservation::ok(
            product.name.clone(),
            product.url.clone(),
            dec("5.00"),
            product.target_price,
        )
        .unwrap();
        let event = AlertEvent {
            kind: AlertKind::PriceTargetReached,
            product,
            observation,
        };

        let err = channel.send(&event).await.unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed(_)));
    }
}
