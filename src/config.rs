use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::util::{is_local_endpoint_url, parse_bool_str};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/chat/stream";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_url: String,
    pub api_token: Option<String>,
    /// Development build: `devOnly` commands are reachable.
    pub dev_mode: bool,
    pub user_role: Option<String>,
    pub log_filter: String,
    pub log_path: Option<PathBuf>,
    pub connect_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = std::env::var("CHAT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_token = non_empty_env("CHAT_API_TOKEN");
        let dev_mode = match non_empty_env("CHAT_DEV_MODE") {
            Some(raw) => parse_bool_str(&raw)
                .with_context(|| format!("CHAT_DEV_MODE must be a boolean, got '{raw}'"))?,
            None => cfg!(debug_assertions),
        };
        let connect_timeout_secs = match non_empty_env("CHAT_CONNECT_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("CHAT_CONNECT_TIMEOUT_SECS must be an integer, got '{raw}'"))?,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_url,
            api_token,
            dev_mode,
            user_role: non_empty_env("CHAT_USER_ROLE"),
            log_filter: non_empty_env("CHAT_LOG").unwrap_or_else(|| "info".to_string()),
            log_path: non_empty_env("CHAT_LOG_PATH").map(PathBuf::from),
            connect_timeout_secs,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid CHAT_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.is_local_endpoint() && self.api_token.is_none() {
            bail!(
                "CHAT_API_TOKEN must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if self.connect_timeout_secs == 0 {
            bail!("CHAT_CONNECT_TIMEOUT_SECS must be greater than zero");
        }

        Ok(())
    }

    fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: &[&str] = &[
        "CHAT_API_URL",
        "CHAT_API_TOKEN",
        "CHAT_DEV_MODE",
        "CHAT_USER_ROLE",
        "CHAT_LOG",
        "CHAT_LOG_PATH",
        "CHAT_CONNECT_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_load_defaults_to_local_backend() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        let config = Config::load().unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.api_token, None);
        assert_eq!(config.dev_mode, cfg!(debug_assertions));
        assert_eq!(config.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_reads_overrides() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var("CHAT_API_URL", "https://chat.example.com/api/chat/stream");
        std::env::set_var("CHAT_API_TOKEN", "secret");
        std::env::set_var("CHAT_DEV_MODE", "off");
        std::env::set_var("CHAT_USER_ROLE", "admin");
        std::env::set_var("CHAT_LOG_PATH", "/tmp/chatstream.log");
        let config = Config::load().unwrap();
        clear_env();

        assert!(!config.dev_mode);
        assert_eq!(config.user_role.as_deref(), Some("admin"));
        assert_eq!(config.log_path, Some(PathBuf::from("/tmp/chatstream.log")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_unparseable_dev_mode() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var("CHAT_DEV_MODE", "sometimes");
        let result = Config::load();
        clear_env();
        assert!(result.is_err());
    }
}
