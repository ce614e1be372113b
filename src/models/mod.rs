use serde::{Deserialize, Serialize};

pub mod observation;
pub mod product;
pub mod run;

// Re-exports for convenience
pub use observation::*;
pub use product::*;
pub use run::*;

// Common enums used across models

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum ObservationStatus {
    #[sqlx(rename = "ok")]
    Ok,
    #[sqlx(rename = "fetch_error")]
    FetchError,
    #[sqlx(rename = "parse_error")]
    ParseError,
}

impl ObservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationStatus::Ok => "ok",
            ObservationStatus::FetchError => "fetch_error",
            ObservationStatus::ParseError => "parse_error",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PriceTargetReached,
    SystemDegraded,
}

/// Pipeline stage a product was in when an error occurred.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Extract,
    Persist,
    Alert,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Persist => "persist",
            Stage::Alert => "alert",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ObservationStatus::Ok).unwrap(),
            "\"ok\""
        );
        assert_eq!(
            serde_json::to_string(&ObservationStatus::FetchError).unwrap(),
            "\"fetch_error\""
        );
        assert_eq!(
            serde_json::to_string(&ObservationStatus::ParseError).unwrap(),
            "\"parse_error\""
        );
    }

    #[test]
    fn test_observation_status_deserialization() {
        assert_eq!(
            serde_json::from_str::<ObservationStatus>("\"ok\"").unwrap(),
            ObservationStatus::Ok
        );
        assert_eq!(
            serde_json::from_str::<ObservationStatus>("\"fetch_error\"").unwrap(),
            ObservationStatus::FetchError
        );
    }

    #[test]
    fn test_alert_kind_values() {
        let values = vec![AlertKind::PriceTargetReached, AlertKind::SystemDegraded];
        for value in values {
            let serialized = serde_json::to_string(&value).unwrap();
            let deserialized: AlertKind = serde_json::from_str(&serialized).unwrap();
            assert_eq!(value, deserialized);
        }
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Fetch.to_string(), "fetch");
        assert_eq!(Stage::Persist.to_string(), "persist");
    }
}
