// src/config.rs
use crate::generation::poller::{PollConfig, DEFAULT_POLL_DEADLINE, DEFAULT_POLL_INTERVAL};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEV_JWT_SECRET: &str = "default_secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    /// Origin used to build links sent by e-mail.
    pub public_base_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub workflow_webhook_url: Option<String>,
    pub workflow_callback_secret: Option<String>,
    pub poll: PollConfig,
    pub require_email_verification: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!("⚠️ JWT_SECRET not set, using an insecure development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let bind_addr_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_raw.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind_addr_raw.clone(),
        })?;

        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{}", bind_addr_raw))
            .trim_end_matches('/')
            .to_string();

        let interval = parse_secs(get("POLL_INTERVAL_SECS"), "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL)?;
        let deadline = parse_secs(get("POLL_TIMEOUT_SECS"), "POLL_TIMEOUT_SECS", DEFAULT_POLL_DEADLINE)?;

        let require_email_verification = match get("REQUIRE_EMAIL_VERIFICATION").as_deref() {
            None => true,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "REQUIRE_EMAIL_VERIFICATION",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr,
            public_base_url,
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            workflow_webhook_url: get("WORKFLOW_WEBHOOK_URL"),
            workflow_callback_secret: get("WORKFLOW_CALLBACK_SECRET"),
            poll: PollConfig { interval, deadline },
            require_email_verification,
        })
    }
}

fn parse_secs(raw: Option<String>, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => match value.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::Invalid { name, value }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(config_from(&[]).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
        assert_eq!(
            config_from(&[("DATABASE_URL", "  ")]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/libelula")]).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.public_base_url, "http://0.0.0.0:3000");
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert!(config.gemini_api_key.is_none());
        assert!(config.workflow_webhook_url.is_none());
        assert_eq!(config.poll.interval, Duration::from_secs(3));
        assert_eq!(config.poll.deadline, Duration::from_secs(60));
        assert!(config.require_email_verification);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://db"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("PUBLIC_BASE_URL", "https://libelula.dev/"),
            ("GEMINI_API_KEY", "key"),
            ("POLL_INTERVAL_SECS", "5"),
            ("POLL_TIMEOUT_SECS", "120"),
            ("REQUIRE_EMAIL_VERIFICATION", "false"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.public_base_url, "https://libelula.dev");
        assert_eq!(config.gemini_api_key.as_deref(), Some("key"));
        assert_eq!(config.poll.interval, Duration::from_secs(5));
        assert_eq!(config.poll.deadline, Duration::from_secs(120));
        assert!(!config.require_email_verification);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("DATABASE_URL", "x"), ("BIND_ADDR", "nope")]),
            Err(ConfigError::Invalid { name: "BIND_ADDR", .. })
        ));
        assert!(matches!(
            config_from(&[("DATABASE_URL", "x"), ("POLL_TIMEOUT_SECS", "0")]),
            Err(ConfigError::Invalid { name: "POLL_TIMEOUT_SECS", .. })
        ));
        assert!(matches!(
            config_from(&[("DATABASE_URL", "x"), ("REQUIRE_EMAIL_VERIFICATION", "maybe")]),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
