//! Bounded retry around a single request

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    constants::{DEFAULT_MAX_RETRIES, STATUS_FULLY_BOOTED},
    error::AmiResult,
    headers::AmiHeader,
    message::AmiMessage,
};

/// Opt-in retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retry at all.
    pub enabled: bool,
    /// Total attempts, including the first.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Enabled policy making up to `max_retries` attempts.
    pub fn attempts(max_retries: u32) -> Self {
        Self {
            enabled: true,
            max_retries,
        }
    }

    /// Single attempt, no retry.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Number of attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        if self.enabled && self.max_retries > 1 {
            self.max_retries
        } else {
            1
        }
    }
}

/// Whether a successful reply still warrants another attempt.
fn needs_retry(reply: &AmiMessage) -> bool {
    reply.is_empty()
        || reply
            .header(AmiHeader::Status)
            .is_some_and(|s| s.eq_ignore_ascii_case(STATUS_FULLY_BOOTED))
}

/// Run `attempt` under `policy`.
///
/// The closure receives the 1-based attempt number. Empty replies,
/// `Status: Fully Booted` replies and transient errors are retried until
/// attempts run out; any other error stops at once. When attempts run out
/// the last outcome is returned as-is.
pub async fn with_retry<F, Fut>(policy: &RetryPolicy, mut attempt: F) -> AmiResult<AmiMessage>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AmiResult<AmiMessage>>,
{
    let max = policy.max_attempts();
    if max == 1 {
        return attempt(1).await;
    }

    let mut n = 1;
    loop {
        let started = Instant::now();
        let outcome = attempt(n).await;
        let elapsed = started.elapsed();
        debug!(
            "[RETRY] attempt {}/{} finished in {}ms",
            n,
            max,
            elapsed.as_millis()
        );

        let retryable = match &outcome {
            Ok(reply) => needs_retry(reply),
            Err(e) => e.is_transient(),
        };
        if !retryable || n >= max {
            if retryable {
                warn!("[RETRY] giving up after {} attempts", n);
            }
            return outcome;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AmiError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn reply(headers: &[(&str, &str)]) -> AmiMessage {
        let mut m = AmiMessage::new();
        for (k, v) in headers {
            m.push_header(*k, *v);
        }
        m
    }

    #[tokio::test]
    async fn disabled_runs_once() {
        let calls = AtomicU32::new(0);
        let out = with_retry(&RetryPolicy::disabled(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(AmiMessage::new()) }
        })
        .await
        .unwrap();
        assert!(out.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = AtomicU32::new(0);
        let _ = with_retry(&RetryPolicy::attempts(1), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(AmiMessage::new()) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fully_booted_then_success() {
        let calls = AtomicU32::new(0);
        let out = with_retry(&RetryPolicy::attempts(3), |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    Ok(reply(&[("Response", "Success"), ("Status", "Fully Booted")]))
                } else {
                    Ok(reply(&[("Response", "Success"), ("Ping", "Pong")]))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(out.get("Ping"), "Pong");
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&RetryPolicy::attempts(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AmiError::ConnTimeout { timeout_ms: 10 }) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, AmiError::ConnTimeout { .. }));
    }

    #[tokio::test]
    async fn permanent_error_stops() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&RetryPolicy::attempts(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AmiError::Network("EOF".into())) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.is_network());
    }

    #[test]
    fn policy_from_json() {
        let p: RetryPolicy = serde_json::from_str(r#"{"enabled": true}"#).unwrap();
        assert_eq!(p, RetryPolicy::attempts(DEFAULT_MAX_RETRIES));
    }
}
