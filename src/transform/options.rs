use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Zone used when none is configured
pub const DEFAULT_ZONE: Tz = chrono_tz::Asia::Shanghai;

/// Field names rewritten when none are configured
pub const DEFAULT_FIELD_NAMES: [&str; 2] = ["createdAt", "updatedAt"];

/// Configuration for the date transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// When false the input is handed back untouched
    pub enabled: bool,

    /// Zone every rewritten date is expressed in
    pub zone: Tz,

    /// Keys whose values are treated as dates
    pub field_names: Vec<String>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        TransformOptions {
            enabled: true,
            zone: DEFAULT_ZONE,
            field_names: DEFAULT_FIELD_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TransformOptions {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = zone;
        self
    }

    /// Set the zone from an IANA name such as `Europe/Berlin`
    pub fn with_zone_name(self, name: &str) -> Result<Self, ConfigError> {
        let zone = name
            .trim()
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownZone(name.to_string()))?;
        Ok(self.with_zone(zone))
    }

    pub fn with_field_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_names = names.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = TransformOptions::default();
        assert!(options.enabled);
        assert_eq!(options.zone, chrono_tz::Asia::Shanghai);
        assert_eq!(options.field_names, vec!["createdAt", "updatedAt"]);
    }

    #[test]
    fn test_zone_by_name() {
        let options = TransformOptions::default().with_zone_name("UTC").unwrap();
        assert_eq!(options.zone, chrono_tz::UTC);

        let err = TransformOptions::default()
            .with_zone_name("Mars/Olympus")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownZone(name) if name == "Mars/Olympus"));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let options: TransformOptions =
            serde_json::from_value(json!({"zone": "Europe/Berlin"})).unwrap();

        assert!(options.enabled);
        assert_eq!(options.zone, chrono_tz::Europe::Berlin);
        assert_eq!(options.field_names, vec!["createdAt", "updatedAt"]);
    }

    #[test]
    fn test_unknown_zone_in_config_is_rejected() {
        let result: Result<TransformOptions, _> =
            serde_json::from_value(json!({"zone": "Nowhere/Special"}));
        assert!(result.is_err());
    }
}
