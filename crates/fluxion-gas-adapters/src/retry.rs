// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz


//! Retry with exponential backoff for outgoing HTTP requests

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

/// How often and how patiently a request is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after every failure
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Send a request until it goes through or the policy gives up.
///
/// Only transport errors are retried. A response with an error status is returned to
/// the caller as is.
pub(crate) async fn retry_request<F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut request_fn: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempts = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempts += 1;
        match request_fn().await {
            Ok(response) => return Ok(response),
            Err(e) if attempts >= policy.max_attempts => {
                error!("❌ [{label}] Request failed after {attempts} attempts: {e}");
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "⚠️ [{label}] Request failed (attempt {attempts}/{}): {e}. Retrying in {delay:?}",
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_policy_needs_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::default().max_attempts, 3);
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried_until_exhausted() {
        let client = reqwest::Client::new();
        let attempts = AtomicU32::new(0);

        // Port 9 (discard) on localhost is closed in test environments
        let result = retry_request(RetryPolicy::new(3, Duration::from_millis(1)), "test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            client.get("http://127.0.0.1:9/").send()
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_error_status_is_returned_without_retry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/", server.url());
        let response = retry_request(RetryPolicy::default(), "test", || client.get(&url).send())
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 500);
        mock.assert_async().await;
    }
}
