use anyhow::anyhow;
use chrono_tz::Tz;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub gpsd_addr: String,
    pub location_high_accuracy: bool,
    pub location_timeout: Duration,
    pub location_max_age: Duration,
    pub allow_manual_location: bool,
    pub resolve_addresses: bool,
    pub report_locations: bool,
    pub time_zone: Tz,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            api_token: None,
            gpsd_addr: "127.0.0.1:2947".to_string(),
            location_high_accuracy: true,
            location_timeout: Duration::from_secs(10),
            location_max_age: Duration::from_secs(30),
            allow_manual_location: false,
            resolve_addresses: false,
            report_locations: false,
            time_zone: Tz::UTC,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let api_base_url = lookup("API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);

        let api_token = lookup("API_TOKEN").filter(|token| !token.trim().is_empty());

        let gpsd_addr = lookup("GPSD_ADDR").unwrap_or(defaults.gpsd_addr);

        let location_high_accuracy = lookup("LOCATION_HIGH_ACCURACY")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.location_high_accuracy);

        let location_timeout = lookup("LOCATION_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.location_timeout);

        let location_max_age = lookup("LOCATION_MAX_AGE_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.location_max_age);

        let allow_manual_location = lookup("ALLOW_MANUAL_LOCATION")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.allow_manual_location);

        let resolve_addresses = lookup("RESOLVE_ADDRESSES")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.resolve_addresses);

        let report_locations = lookup("REPORT_LOCATIONS")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.report_locations);

        let time_zone_name = lookup("APP_TIMEZONE").unwrap_or_else(|| "UTC".to_string());
        let time_zone: Tz = time_zone_name
            .parse()
            .map_err(|_| anyhow!("Invalid APP_TIMEZONE value: {}", time_zone_name))?;

        Ok(Config {
            api_base_url,
            api_token,
            gpsd_addr,
            location_high_accuracy,
            location_timeout,
            location_max_age,
            allow_manual_location,
            resolve_addresses,
            report_locations,
            time_zone,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = load(&[]).expect("config");
        assert_eq!(config.api_base_url, "http://localhost:5000/api");
        assert_eq!(config.api_token, None);
        assert_eq!(config.location_timeout, Duration::from_secs(10));
        assert_eq!(config.location_max_age, Duration::from_secs(30));
        assert!(config.location_high_accuracy);
        assert!(!config.allow_manual_location);
        assert_eq!(config.time_zone, Tz::UTC);
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("API_BASE_URL", "https://care.example.com/api/"),
            ("API_TOKEN", "abc"),
            ("LOCATION_TIMEOUT_SECS", "5"),
            ("LOCATION_MAX_AGE_SECS", "0"),
            ("ALLOW_MANUAL_LOCATION", "yes"),
            ("REPORT_LOCATIONS", "1"),
            ("APP_TIMEZONE", "America/New_York"),
        ])
        .expect("config");
        assert_eq!(config.api_base_url, "https://care.example.com/api");
        assert_eq!(config.api_token.as_deref(), Some("abc"));
        assert_eq!(config.location_timeout, Duration::from_secs(5));
        assert_eq!(config.location_max_age, Duration::ZERO);
        assert!(config.allow_manual_location);
        assert!(config.report_locations);
        assert_eq!(config.time_zone, chrono_tz::America::New_York);
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let config = load(&[
            ("LOCATION_TIMEOUT_SECS", "soon"),
            ("LOCATION_HIGH_ACCURACY", "maybe"),
            ("API_TOKEN", "  "),
        ])
        .expect("config");
        assert_eq!(config.location_timeout, Duration::from_secs(10));
        assert!(config.location_high_accuracy);
        assert_eq!(config.api_token, None);
    }

    #[test]
    fn invalid_time_zone_is_an_error() {
        let err = load(&[("APP_TIMEZONE", "Mars/Olympus")]).unwrap_err();
        assert!(err.to_string().contains("APP_TIMEZONE"));
    }
}
