use anyhow::{Context, Result, anyhow};
use chrono::NaiveTime;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::aggregate::DEFAULT_THRESHOLD_MINUTES;
use crate::model::day_record::minutes_past_midnight;

/// What the `logs` field of a published payload carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadMode {
    /// Finished day records, aggregated on the server.
    Records,
    /// Raw punches; receivers reduce them.
    Punches,
}

impl FromStr for PayloadMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "records" => Ok(PayloadMode::Records),
            "punches" => Ok(PayloadMode::Punches),
            other => Err(anyhow!("expected `records` or `punches`, got `{other}`")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: String,

    // Terminal bridge
    pub device_addr: String,
    pub device_port: u16,
    pub device_timeout: Duration,

    // Distribution
    pub redis_url: Option<String>,
    pub redis_channel: String,
    pub payload_mode: PayloadMode,

    pub database_url: Option<String>,

    // Aggregation
    pub poll_interval: Duration,
    pub threshold_minutes: u32,
    /// Single source of truth for who counts. Empty means every enrolled user.
    pub active_employee_ids: Vec<String>,
    pub retention_days: Option<u32>,

    // Rate limiting
    pub rate_connect_per_min: u32,

    pub api_prefix: String,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{key} must be set"));
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let poll_secs: u64 = parse_var("POLL_INTERVAL_SECS", &or("POLL_INTERVAL_SECS", "60"))?;
        if poll_secs == 0 {
            return Err(anyhow!("POLL_INTERVAL_SECS must be at least 1"));
        }

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,

            device_addr: required("DEVICE_ADDR")?,
            device_port: parse_var("DEVICE_PORT", &or("DEVICE_PORT", "8000"))?,
            device_timeout: Duration::from_millis(parse_var(
                "DEVICE_TIMEOUT_MS",
                &or("DEVICE_TIMEOUT_MS", "5000"),
            )?),

            redis_url: var("REDIS_URL"),
            redis_channel: or("REDIS_CHANNEL", "attendance"),
            payload_mode: parse_var("PAYLOAD_MODE", &or("PAYLOAD_MODE", "records"))?,

            database_url: var("DATABASE_URL"),

            poll_interval: Duration::from_secs(poll_secs),
            threshold_minutes: match var("LATE_THRESHOLD") {
                Some(raw) => parse_threshold(&raw).context("LATE_THRESHOLD")?,
                None => DEFAULT_THRESHOLD_MINUTES,
            },
            active_employee_ids: var("ACTIVE_EMPLOYEE_IDS")
                .map(|raw| split_ids(&raw))
                .unwrap_or_default(),
            retention_days: var("RETENTION_DAYS")
                .map(|raw| parse_var("RETENTION_DAYS", &raw))
                .transpose()?,

            rate_connect_per_min: parse_var(
                "RATE_CONNECT_PER_MIN",
                &or("RATE_CONNECT_PER_MIN", "120"),
            )?,

            api_prefix: or("API_PREFIX", "/api"),
            log_dir: or("LOG_DIR", "logs"),
        })
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("{key} is invalid ({raw}): {e}"))
}

/// `HH:MM` (or bare minutes past midnight) to minutes past midnight.
pub fn parse_threshold(raw: &str) -> Result<u32> {
    let raw = raw.trim();
    if let Ok(minutes) = raw.parse::<u32>() {
        return Ok(minutes);
    }
    let time = NaiveTime::parse_from_str(raw, "%H:%M")
        .with_context(|| format!("expected HH:MM, got `{raw}`"))?;
    Ok(minutes_past_midnight(time))
}

fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config =
            Config::from_lookup(lookup(&[("SERVER_ADDR", "0.0.0.0:8090"), ("DEVICE_ADDR", "10.10.80.8")])).unwrap();

        assert_eq!(config.device_port, 8000);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.threshold_minutes, 540);
        assert_eq!(config.payload_mode, PayloadMode::Records);
        assert_eq!(config.redis_channel, "attendance");
        assert!(config.redis_url.is_none());
        assert!(config.active_employee_ids.is_empty());
        assert!(config.retention_days.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "0.0.0.0:8090"),
            ("DEVICE_ADDR", "10.10.80.8"),
            ("LATE_THRESHOLD", "08:30"),
            ("ACTIVE_EMPLOYEE_IDS", "1019, 1022,,36"),
            ("PAYLOAD_MODE", "Punches"),
            ("RETENTION_DAYS", "45"),
        ]))
        .unwrap();

        assert_eq!(config.threshold_minutes, 510);
        assert_eq!(config.active_employee_ids, vec!["1019", "1022", "36"]);
        assert_eq!(config.payload_mode, PayloadMode::Punches);
        assert_eq!(config.retention_days, Some(45));
    }

    #[test]
    fn missing_and_malformed_values_are_reported() {
        let missing = Config::from_lookup(lookup(&[("SERVER_ADDR", "0.0.0.0:8090")])).unwrap_err();
        assert!(missing.to_string().contains("DEVICE_ADDR"));

        let malformed = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "0.0.0.0:8090"),
            ("DEVICE_ADDR", "10.10.80.8"),
            ("DEVICE_PORT", "http"),
        ]))
        .unwrap_err();
        assert!(malformed.to_string().contains("DEVICE_PORT"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "0.0.0.0:8090"),
            ("DEVICE_ADDR", "10.10.80.8"),
            ("POLL_INTERVAL_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL_SECS"));

        let one = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "0.0.0.0:8090"),
            ("DEVICE_ADDR", "10.10.80.8"),
            ("POLL_INTERVAL_SECS", "1"),
        ]))
        .unwrap();
        assert_eq!(one.poll_interval, Duration::from_secs(1));
    }
}
