//! Runtime configuration resolved from environment variables.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `MULTIQUERY_API_BASE` | Base URL of the OpenAI-compatible API | `https://api.openai.com` |
//! | `MULTIQUERY_CONNECT_TIMEOUT` | Connect timeout in seconds | `10` |
//! | `MULTIQUERY_TELEMETRY` | Enable the file event log | off |
//! | `MULTIQUERY_UI_DIR` | Static UI directory served by `serve` | `web` |

use std::{env, path::PathBuf, time::Duration};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_UI_DIR: &str = "web";

pub const ENV_API_BASE: &str = "MULTIQUERY_API_BASE";
pub const ENV_CONNECT_TIMEOUT: &str = "MULTIQUERY_CONNECT_TIMEOUT";
pub const ENV_TELEMETRY: &str = "MULTIQUERY_TELEMETRY";
pub const ENV_UI_DIR: &str = "MULTIQUERY_UI_DIR";

/**
 * \brief Process configuration shared by the CLI and the HTTP service.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /** \brief API base, without the `/v1` suffix */
    pub api_base: String,
    pub connect_timeout: Duration,
    pub telemetry_enabled: bool,
    pub ui_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            telemetry_enabled: false,
            ui_dir: PathBuf::from(DEFAULT_UI_DIR),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /**
     * \brief Build a configuration from an arbitrary key lookup; unset or unparsable values keep their default.
     */
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            cfg.api_base = base.trim().trim_end_matches('/').to_string();
        }
        if let Some(secs) = lookup(ENV_CONNECT_TIMEOUT).and_then(|v| v.trim().parse::<u64>().ok()) {
            cfg.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = lookup(ENV_TELEMETRY) {
            cfg.telemetry_enabled = parse_flag(&flag);
        }
        if let Some(dir) = lookup(ENV_UI_DIR).filter(|v| !v.trim().is_empty()) {
            cfg.ui_dir = PathBuf::from(dir);
        }
        cfg
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let cfg = AppConfig::from_lookup(|_| None);
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            (ENV_API_BASE, "http://localhost:8080/"),
            (ENV_CONNECT_TIMEOUT, "3"),
            (ENV_TELEMETRY, "Yes"),
            (ENV_UI_DIR, "dist"),
        ]));
        assert_eq!(cfg.api_base, "http://localhost:8080");
        assert_eq!(cfg.connect_timeout, Duration::from_secs(3));
        assert!(cfg.telemetry_enabled);
        assert_eq!(cfg.ui_dir, PathBuf::from("dist"));
    }

    #[test]
    fn test_invalid_timeout_keeps_default() {
        let cfg = AppConfig::from_lookup(lookup_from(&[(ENV_CONNECT_TIMEOUT, "soon")]));
        assert_eq!(
            cfg.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
    }
}
