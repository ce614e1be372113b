use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::channel::{ChannelAck, ChannelError, NotificationChannel};
use crate::models::{AlertEvent, AlertKind};

/// Prints alerts to standard output. Always available; ships with the core.
pub struct ConsoleChannel;

impl ConsoleChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, event: &AlertEvent) -> Result<ChannelAck, ChannelError> {
        println!("{}", format_alert(event));
        Ok(ChannelAck {
            channel: self.name().to_string(),
            message_id: None,
        })
    }
}

pub(crate) fn format_alert(event: &AlertEvent) -> String {
    match event.kind {
        AlertKind::PriceTargetReached => {
            let price = event.observation.price.unwrap_or_default();
            let target = event.observation.target_price;
            let savings = target - price;
            let savings_pct = if target > Decimal::ZERO {
                savings / target * Decimal::from(100)
            } else {
                Decimal::ZERO
            };
            format!(
                "ALERTA DE PRECO: {}\n  preco atual: {}\n  preco alvo:  {}\n  economia:    {} ({savings_pct:.1}%)\n  link: {}\n  verificado em: {}",
                event.product.name,
                format_price(price),
                format_price(target),
                format_price(savings),
                event.product.url,
                format_timestamp(event.observation.observed_at),
            )
        }
        AlertKind::SystemDegraded => format!(
            "MONITORAMENTO DEGRADADO: {}\n  ultimo erro: {}\n  link: {}\n  verificado em: {}",
            event.product.name,
            event
                .observation
                .error_detail
                .as_deref()
                .unwrap_or("desconhecido"),
            event.product.url,
            format_timestamp(event.observation.observed_at),
        ),
    }
}

/// Brazilian currency formatting: `R$ 1.234,56`.
pub(crate) fn format_price(value: Decimal) -> String {
    let plain = format!("{:.2}", value);
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let mut grouped = String::new();
    let chars: Vec<char> = digits.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*c);
    }

    format!("R$ {sign}{grouped},{frac_part}")
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%d/%m/%Y %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureKind, PriceObservation, ProductConfig};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn target_event() -> AlertEvent {
        let product = ProductConfig::new("Cafeteira", "https://example.com/cafeteira", dec("500.00"));
        let observation = PriceObservation::ok(
            product.name.clone(),
            product.url.clone(),
            dec("1234.56"),
            dec("2000.00"),
        )
        .unwrap();
        AlertEvent {
            kind: AlertKind::PriceTargetReached,
            product,
            observation,
        }
    }

    #[test]
    fn test_price_formatting() {
        assert_eq!(format_price(dec("1234.56")), "R$ 1.234,56");
        assert_eq!(format_price(dec("99.90")), "R$ 99,90");
        assert_eq!(format_price(dec("1000000.00")), "R$ 1.000.000,00");
        assert_eq!(format_price(dec("0.50")), "R$ 0,50");
    }

    #[test]
    fn test_target_alert_formatting() {
        let text = format_alert(&target_event());
        assert!(text.contains("ALERTA DE PRECO: Cafeteira"));
        assert!(text.contains("R$ 1.234,56"));
        assert!(text.contains("https://example.com/cafeteira"));
    }

    #[test]
    fn test_degraded_alert_formatting() {
        let product = ProductConfig::new("Widget", "https://example.com/w", dec("10.00"));
        let observation = PriceObservation::failed(
            product.name.clone(),
            product.url.clone(),
            product.target_price,
            FailureKind::Fetch,
            "timed out after 4 attempts".to_string(),
        );
        let event = AlertEvent {
            kind: AlertKind::SystemDegraded,
            product,
            observation,
        };
        let text = format_alert(&event);
        assert!(text.contains("MONITORAMENTO DEGRADADO: Widget"));
        assert!(text.contains("timed out after 4 attempts"));
    }

    #[tokio::test]
    async fn test_console_send_acknowledges() {
        let channel = ConsoleChannel::new();
        let ack = channel.send(&target_event()).await.unwrap();
        assert_eq!(ack.channel, "console");
    }
}
