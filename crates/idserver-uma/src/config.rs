//! UMA service configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for ticket issuance and policy decisions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UmaConfig {
    /// Issuer URL advertised in `need_info` responses; claim tokens must
    /// come from here.
    pub issuer: String,

    /// How long a permission ticket stays redeemable.
    #[serde(with = "humantime_serde")]
    pub ticket_lifetime: Duration,
}

impl Default for UmaConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            ticket_lifetime: Duration::from_secs(300), // 5 minutes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_humantime_parsing() {
        let config = UmaConfig::default();
        assert_eq!(config.ticket_lifetime, Duration::from_secs(300));

        let parsed: UmaConfig =
            serde_json::from_str(r#"{"ticket_lifetime": "10m"}"#).unwrap();
        assert_eq!(parsed.ticket_lifetime, Duration::from_secs(600));
        assert_eq!(parsed.issuer, "http://localhost:8080");
    }
}
