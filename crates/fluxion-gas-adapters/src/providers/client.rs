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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fluxion_gas_core::{FetchError, FetchResult, PriceFetcher};
use fluxion_gas_types::PriceSeries;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::Provider;
use crate::retry::{RetryPolicy, retry_request};

/// Default HTTP timeout for provider requests
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one upstream price provider
#[derive(Debug, Clone)]
pub struct ProviderClient {
    provider: Provider,
    endpoint: String,
    client: Client,
    retry: RetryPolicy,
}

impl ProviderClient {
    /// Create a client for the provider's public endpoint
    pub fn new(provider: Provider) -> FetchResult<Self> {
        Self::with_options(provider, None, DEFAULT_TIMEOUT)
    }

    /// Create a client with an endpoint override (proxies, tests) and a custom timeout
    pub fn with_options(
        provider: Provider,
        endpoint: Option<String>,
        timeout: Duration,
    ) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fluxion-gas/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to build HTTP client: {e}")))?;

        let endpoint = endpoint.unwrap_or_else(|| provider.default_endpoint().to_owned());
        info!("⛽ Initializing {provider} price client: {endpoint}");

        Ok(Self {
            provider,
            endpoint,
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Set custom retry configuration
    #[must_use]
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.retry = RetryPolicy::new(max_retries, retry_delay);
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn transport_error(e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Http(e.to_string())
    }
}

#[async_trait]
impl PriceFetcher for ProviderClient {
    async fn fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> FetchResult<PriceSeries> {
        let query = self.provider.query(start, end);
        debug!("🔍 [{}] GET {} {:?}", self.provider, self.endpoint, query);

        let response = retry_request(self.retry, self.provider.display_name(), || async {
            let mut request = self.client.get(&self.endpoint).query(&query);
            for (name, value) in self.provider.headers() {
                request = request.header(*name, *value);
            }
            request.send().await
        })
        .await
        .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("❌ [{}] Status {}: {}", self.provider, status, message);
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| transport_error(&e))?;
        let series = self.provider.parse(&body)?;

        if series.is_empty() {
            warn!("⚠️ [{}] Provider returned no prices", self.provider);
        } else {
            debug!(
                "✅ [{}] Received {} prices ({} → {})",
                self.provider,
                series.len(),
                series.first().map(|p| p.timestamp).unwrap_or(start),
                series.last().map(|p| p.timestamp).unwrap_or(end)
            );
        }
        Ok(series)
    }

    fn name(&self) -> &str {
        self.provider.display_name()
    }

    fn attribution(&self) -> &str {
        self.provider.attribution()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2025, 1, 14, 23, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 16, 22, 0, 0).unwrap(),
        )
    }

    fn client(provider: Provider, server: &Server) -> ProviderClient {
        ProviderClient::with_options(provider, Some(format!("{}/prices", server.url())), DEFAULT_TIMEOUT)
            .unwrap()
            .with_retry_config(2, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_energy_zero_fetch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/prices")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("fromDate".into(), "2025-01-14T23:00:00Z".into()),
                Matcher::UrlEncoded("tillDate".into(), "2025-01-16T22:00:00Z".into()),
                Matcher::UrlEncoded("interval".into(), "4".into()),
                Matcher::UrlEncoded("usageType".into(), "3".into()),
                Matcher::UrlEncoded("inclBtw".into(), "true".into()),
            ]))
            .match_header("origin", "https://www.mijndomein.nl")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "Prices": [
                        {"price": 1.31, "readingDate": "2025-01-14T23:00:00Z"},
                        {"price": 1.32, "readingDate": "2025-01-15T00:00:00Z"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client(Provider::EnergyZero, &server);
        let (start, end) = window();
        let series = client.fetch(start, end).await.unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.first().unwrap().price, 1.31);
        assert_eq!(client.attribution(), "Data provided by Energy Zero API");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_easy_energy_fetch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/prices")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("startTimestamp".into(), "2025-01-14T23:00:00Z".into()),
                Matcher::UrlEncoded("endTimestamp".into(), "2025-01-16T22:00:00Z".into()),
                Matcher::UrlEncoded("includeVat".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(
                json!([
                    {"Timestamp": "2025-01-14T23:00:00+00:00", "TariffUsage": 1.1},
                    {"Timestamp": "2025-01-15T00:00:00+00:00", "TariffUsage": 1.2},
                    {"Timestamp": "2025-01-15T01:00:00+00:00", "TariffUsage": 1.3}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = client(Provider::EasyEnergy, &server);
        let (start, end) = window();
        let series = client.fetch(start, end).await.unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.last().unwrap().price, 1.3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/prices")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("maintenance")
            .expect(1)
            .create_async()
            .await;

        let client = client(Provider::EnergyZero, &server);
        let (start, end) = window();
        let err = client.fetch(start, end).await.unwrap_err();

        assert_eq!(
            err,
            FetchError::Status {
                status: 503,
                message: "maintenance".to_owned()
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/prices")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = client(Provider::EasyEnergy, &server);
        let (start, end) = window();
        let err = client.fetch(start, end).await.unwrap_err();

        assert!(matches!(err, FetchError::MalformedResponse(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_host_is_http_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let client = ProviderClient::with_options(
            Provider::EnergyZero,
            Some("http://127.0.0.1:9/prices".to_owned()),
            Duration::from_secs(2),
        )
        .unwrap()
        .with_retry_config(2, Duration::from_millis(10));

        let (start, end) = window();
        let err = client.fetch(start, end).await.unwrap_err();
        assert!(matches!(err, FetchError::Http(_) | FetchError::Timeout));
    }
}
