//! Client and orchestration configuration.
//!
//! Durations are serialized as fractional seconds (`f64`) so configs
//! can be written by hand as JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Automatic retry of transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    #[serde(with = "duration_serde")]
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Default retry budget.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    /// Default delay before the first retry.
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based):
    /// `base_delay * 2^attempt`, saturating.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            base_delay: Self::DEFAULT_BASE_DELAY,
        }
    }
}

/// Network client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server root that relative request paths are joined onto.
    pub base_url: String,
    /// Deadline for ordinary requests.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Deadline for multipart uploads.
    #[serde(with = "duration_serde")]
    pub upload_timeout: Duration,
    /// Retry behavior for transient failures.
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Default server root.
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
    /// Default deadline for ordinary requests.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default deadline for uploads.
    pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default settings pointed at `base_url`.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            upload_timeout: Self::DEFAULT_UPLOAD_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// How the orchestrator waits for a submitted job to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionPolicy {
    /// Delay between two status polls.
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,
    /// Polls before giving up. `0` treats submission as completion.
    pub max_polls: u32,
}

impl CompletionPolicy {
    /// Default delay between polls.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
    /// Default poll budget.
    pub const DEFAULT_MAX_POLLS: u32 = 60;

    /// Complete at submission without polling.
    #[must_use]
    pub const fn submit_only() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            max_polls: 0,
        }
    }
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_polls: Self::DEFAULT_MAX_POLLS,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..4).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);
    }

    #[test]
    fn backoff_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(40), Duration::from_secs(u64::from(u32::MAX)));
    }

    #[test]
    fn client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.upload_timeout, Duration::from_secs(60));
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url":"https://api.example.com","retry":{"max_retries":1}}"#)
                .unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.base_delay, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(CompletionPolicy::default()).unwrap();
        assert_eq!(json["poll_interval"], 2.0);
        assert_eq!(json["max_polls"], 60);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let err = serde_json::from_str::<CompletionPolicy>(r#"{"poll_interval":-1.0}"#);
        assert!(err.is_err());
    }
}
