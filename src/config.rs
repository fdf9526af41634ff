//! Environment configuration.
//!
//! Values come from the process environment, with a `.env` file in the
//! working directory loaded first if one exists.

use alloy::primitives::Address;
use eyre::{ensure, eyre, Result, WrapErr};
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_CHANNEL_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// JSON-RPC HTTP endpoint
    pub rpc_url: String,
    pub poll_interval: Duration,
    pub channel_size: usize,
    /// Balance is polled for this address when set
    pub watch_address: Option<Address>,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine.
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, `from_env` without the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let rpc_url = lookup("RPC_URL").ok_or_else(|| eyre!("RPC_URL is not set"))?;

        let poll_interval_ms = match lookup("POLL_INTERVAL_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .wrap_err_with(|| format!("POLL_INTERVAL_MS is not a number: {raw}"))?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };

        let channel_size = match lookup("CHANNEL_SIZE") {
            Some(raw) => raw
                .parse::<usize>()
                .wrap_err_with(|| format!("CHANNEL_SIZE is not a number: {raw}"))?,
            None => DEFAULT_CHANNEL_SIZE,
        };
        ensure!(channel_size > 0, "CHANNEL_SIZE must be at least 1");

        let watch_address = lookup("WATCH_ADDRESS")
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| {
                raw.trim()
                    .parse::<Address>()
                    .wrap_err_with(|| format!("WATCH_ADDRESS is not an address: {raw}"))
            })
            .transpose()?;

        Ok(Self {
            rpc_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
            channel_size,
            watch_address,
            log_json: lookup("RPC_POLLER_LOG_JSON")
                .map(|raw| parse_flag("RPC_POLLER_LOG_JSON", &raw))
                .transpose()?
                .unwrap_or(false),
        })
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(eyre!("{key} is not a boolean: {raw}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("RPC_URL", "http://localhost:8545")]).expect("config");
        assert_eq!(cfg.rpc_url, "http://localhost:8545");
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.channel_size, 16);
        assert_eq!(cfg.watch_address, None);
        assert!(!cfg.log_json);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("RPC_URL", "http://localhost:8545"),
            ("POLL_INTERVAL_MS", "250"),
            ("CHANNEL_SIZE", "4"),
            ("WATCH_ADDRESS", "0x95222290dd7278aa3ddd389cc1e1d165cc4bafe5"),
            ("RPC_POLLER_LOG_JSON", "1"),
        ])
        .expect("config");
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.channel_size, 4);
        assert_eq!(
            cfg.watch_address,
            Some(
                "0x95222290dd7278aa3ddd389cc1e1d165cc4bafe5"
                    .parse::<Address>()
                    .expect("address")
            )
        );
        assert!(cfg.log_json);
    }

    #[test]
    fn test_missing_rpc_url() {
        let err = config(&[]).expect_err("RPC_URL is required");
        assert!(err.to_string().contains("RPC_URL"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config(&[("RPC_URL", "x"), ("POLL_INTERVAL_MS", "soon")]).is_err());
        assert!(config(&[("RPC_URL", "x"), ("CHANNEL_SIZE", "0")]).is_err());
        assert!(config(&[("RPC_URL", "x"), ("WATCH_ADDRESS", "0x1234")]).is_err());
    }

    #[test]
    fn test_log_json_flag_values() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("0", false), ("false", false)] {
            let cfg = config(&[("RPC_URL", "x"), ("RPC_POLLER_LOG_JSON", raw)]).expect("config");
            assert_eq!(cfg.log_json, expected, "RPC_POLLER_LOG_JSON={raw}");
        }
        assert!(config(&[("RPC_URL", "x"), ("RPC_POLLER_LOG_JSON", "maybe")]).is_err());
    }

    #[test]
    fn test_blank_watch_address_is_unset() {
        let cfg = config(&[("RPC_URL", "x"), ("WATCH_ADDRESS", "  ")]).expect("config");
        assert_eq!(cfg.watch_address, None);
    }
}
