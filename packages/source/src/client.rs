//! Explicit HTTP client construction.
//!
//! Every fetch goes through a [`reqwest::Client`] built from a
//! [`HttpClientConfig`] and handed to the source that uses it. There is no
//! shared session.

use std::time::Duration;

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::SourceError;
use crate::retry::RetryPolicy;

/// Certificate handling for outage feed endpoints.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TlsPolicy {
    /// Normal certificate and hostname verification.
    #[default]
    Strict,
    /// Accept certificates that fail verification. Only for utility
    /// endpoints with broken certificate chains.
    AcceptInvalidCerts,
}

/// HTTP settings for one feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Certificate handling.
    pub tls: TlsPolicy,
    /// Retries after the first attempt of each request.
    pub max_retries: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub backoff_ms: u64,
    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            tls: TlsPolicy::Strict,
            max_retries: 5,
            backoff_ms: 1000,
            timeout_secs: 120,
        }
    }
}

impl HttpClientConfig {
    /// Retry policy described by this config.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }

    /// Builds a client with this config's TLS policy and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the TLS backend cannot be
    /// initialised.
    pub fn build_client(&self) -> Result<reqwest::Client, SourceError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent(concat!("outage_map/", env!("CARGO_PKG_VERSION")));

        if self.tls == TlsPolicy::AcceptInvalidCerts {
            log::warn!("TLS certificate verification is disabled for this feed");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn defaults_retry_five_times_one_second_apart() {
        let config = HttpClientConfig::default();
        assert_eq!(config.tls, TlsPolicy::Strict);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_policy().backoff, Duration::from_secs(1));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: HttpClientConfig =
            toml::from_str("tls = \"accept_invalid_certs\"\nmax_retries = 2").unwrap();
        assert_eq!(config.tls, TlsPolicy::AcceptInvalidCerts);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.backoff_ms, 1000);
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn tls_policy_parses_from_str() {
        assert_eq!(TlsPolicy::from_str("strict").unwrap(), TlsPolicy::Strict);
        assert_eq!(TlsPolicy::AcceptInvalidCerts.as_ref(), "accept_invalid_certs");
        assert!(TlsPolicy::from_str("legacy").is_err());
    }

    #[test]
    fn builds_client_for_both_policies() {
        let mut config = HttpClientConfig::default();
        assert!(config.build_client().is_ok());
        config.tls = TlsPolicy::AcceptInvalidCerts;
        assert!(config.build_client().is_ok());
    }
}
