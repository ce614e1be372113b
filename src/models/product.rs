use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::extractor::SelectorRules;

/// Identity and monitoring policy for one tracked item. Supplied by the
/// configuration layer and treated as read-only for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductConfig {
    pub name: String,
    pub url: String,
    pub target_price: Decimal,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub custom_selectors: Option<SelectorRules>,
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
}

fn default_active() -> bool {
    true
}

fn default_min_interval() -> u64 {
    3600
}

impl ProductConfig {
    pub fn new(name: &str, url: &str, target_price: Decimal) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            target_price,
            active: true,
            custom_selectors: None,
            min_interval_secs: default_min_interval(),
        }
    }

    /// Validate configuration integrity, collecting every violation.
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("product name must not be empty".to_string());
        }

        match Url::parse(&self.url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            Ok(parsed) => errors.push(format!("unsupported URL scheme: {}", parsed.scheme())),
            Err(_) => errors.push(format!("invalid URL: {}", self.url)),
        }

        if self.target_price <= Decimal::ZERO {
            errors.push("target price must be greater than zero".to_string());
        }

        if self.min_interval_secs < 60 {
            errors.push("minimum interval must be at least 60 seconds".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_valid_product() {
        let product = ProductConfig::new("Widget", "https://example.com/widget", dec("99.90"));
        assert!(product.validate().is_ok());
        assert!(product.active);
        assert_eq!(product.min_interval_secs, 3600);
    }

    #[test]
    fn test_empty_name_rejected() {
        let product = ProductConfig::new("  ", "https://example.com/widget", dec("99.90"));
        let err = product.validate().unwrap_err();
        assert!(err.contains("name must not be empty"));
    }

    #[test]
    fn test_relative_url_rejected() {
        let product = ProductConfig::new("Widget", "/widget", dec("99.90"));
        assert!(product.validate().unwrap_err().contains("invalid URL"));
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let product = ProductConfig::new("Widget", "ftp://example.com/widget", dec("99.90"));
        assert!(product.validate().unwrap_err().contains("unsupported URL scheme"));
    }

    #[test]
    fn test_non_positive_target_price_rejected() {
        let product = ProductConfig::new("Widget", "https://example.com/widget", dec("0.00"));
        assert!(
            product
                .validate()
                .unwrap_err()
                .contains("target price must be greater than zero")
        );
    }

    #[test]
    fn test_short_interval_rejected() {
        let mut product = ProductConfig::new("Widget", "https://example.com/widget", dec("10.00"));
        product.min_interval_secs = 30;
        assert!(product.validate().unwrap_err().contains("60 seconds"));
    }

    #[test]
    fn test_errors_are_collected() {
        let mut product = ProductConfig::new("", "nope", dec("-1.00"));
        product.min_interval_secs = 0;
        let err = product.validate().unwrap_err();
        assert_eq!(err.matches(';').count(), 3);
    }
}
