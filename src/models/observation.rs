use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AlertKind, ObservationStatus, ProductConfig};

/// Which pipeline stage failed to produce a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fetch,
    Parse,
}

impl FailureKind {
    pub fn status(self) -> ObservationStatus {
        match self {
            FailureKind::Fetch => ObservationStatus::FetchError,
            FailureKind::Parse => ObservationStatus::ParseError,
        }
    }
}

/// One fetch-and-extract outcome for a product at a point in time.
///
/// Rows are append-only: an observation is never updated after it has been
/// stored, and retention pruning is the only deletion path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceObservation {
    pub id: Option<i64>,
    pub product_name: String,
    pub url: String,
    pub price: Option<Decimal>,
    pub target_price: Decimal,
    pub observed_at: DateTime<Utc>,
    pub status: ObservationStatus,
    pub error_detail: Option<String>,
}

impl PriceObservation {
    /// Successful observation. `price` must be non-negative.
    pub fn ok(
        product_name: String,
        url: String,
        price: Decimal,
        target_price: Decimal,
    ) -> Result<Self, String> {
        if price < Decimal::ZERO {
            return Err(format!("price must not be negative: {price}"));
        }
        Ok(Self {
            id: None,
            product_name,
            url,
            price: Some(price),
            target_price,
            observed_at: Utc::now(),
            status: ObservationStatus::Ok,
            error_detail: None,
        })
    }

    /// Failed observation. The failure kind determines the stored status;
    /// the price is always absent.
    pub fn failed(
        product_name: String,
        url: String,
        target_price: Decimal,
        kind: FailureKind,
        error_detail: String,
    ) -> Self {
        Self {
            id: None,
            product_name,
            url,
            price: None,
            target_price,
            observed_at: Utc::now(),
            status: kind.status(),
            error_detail: Some(error_detail),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ObservationStatus::Ok
    }

    /// Status/price consistency: `ok` implies a non-negative price, any
    /// failure implies no price at all.
    pub fn invariant_holds(&self) -> bool {
        match self.status {
            ObservationStatus::Ok => self.price.is_some_and(|p| p >= Decimal::ZERO),
            _ => self.price.is_none(),
        }
    }

    /// True when the observed price is at or below the target snapshot.
    /// Inclusive on purpose: a price exactly at target must alert.
    pub fn target_reached(&self) -> bool {
        match (self.status, self.price) {
            (ObservationStatus::Ok, Some(price)) => price <= self.target_price,
            _ => false,
        }
    }
}

/// A threshold crossing or degradation event, derived from an observation
/// and handed to notification channels. Never persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub product: ProductConfig,
    pub observation: PriceObservation,
}
