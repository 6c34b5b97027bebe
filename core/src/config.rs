//! Client configuration.

use std::time::Duration;

use secrecy::Secret;

use crate::error::{Error, Result};

/// Base URL of the hosted Geckoboard API.
pub const DEFAULT_BASE_URL: &str = "https://api.geckoboard.com";

/// Timeout applied to every HTTP request made by a client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const API_KEY_VAR: &str = "GECKOBOARD_API_KEY";
pub const BASE_URL_VAR: &str = "GECKOBOARD_URL";
pub const TIMEOUT_VAR: &str = "GECKOBOARD_TIMEOUT_SECS";

/// Everything a [`Client`](crate::Client) needs to talk to the API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Configuration for the hosted service with the default timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: Secret::new(api_key.into()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Point the client at another deployment, such as a local test double.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from `GECKOBOARD_API_KEY`, `GECKOBOARD_URL` and
    /// `GECKOBOARD_TIMEOUT_SECS`. Only the API key is required.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ClientConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.is_empty())
            .ok_or(Error::MissingApiKey { var: API_KEY_VAR })?;
        let mut config = Self::new(api_key);

        if let Some(base_url) = lookup(BASE_URL_VAR).filter(|url| !url.is_empty()) {
            config.base_url = base_url;
        }

        if let Some(value) = lookup(TIMEOUT_VAR) {
            let secs = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| Error::InvalidTimeout {
                    var: TIMEOUT_VAR,
                    value: value.clone(),
                })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_for_hosted_service() {
        let config = ClientConfig::new("key-444");
        assert_eq!(config.base_url, "https://api.geckoboard.com");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.api_key.expose_secret(), "key-444");
    }

    #[test]
    fn loads_all_variables() {
        let config = ClientConfig::from_lookup(lookup(&[
            (API_KEY_VAR, "key-444"),
            (BASE_URL_VAR, "http://localhost:3000"),
            (TIMEOUT_VAR, "5"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.api_key.expose_secret(), "key-444");
    }

    #[test]
    fn api_key_is_required() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::MissingApiKey { var: API_KEY_VAR }));

        let err = ClientConfig::from_lookup(lookup(&[(API_KEY_VAR, "")])).unwrap_err();
        assert!(matches!(err, Error::MissingApiKey { .. }));
    }

    #[test]
    fn rejects_bad_timeouts() {
        for value in ["0", "soon", "-3"] {
            let err = ClientConfig::from_lookup(lookup(&[(API_KEY_VAR, "k"), (TIMEOUT_VAR, value)]))
                .unwrap_err();
            assert!(
                matches!(&err, Error::InvalidTimeout { value: v, .. } if v == value),
                "{value}: {err}"
            );
        }
    }
}
