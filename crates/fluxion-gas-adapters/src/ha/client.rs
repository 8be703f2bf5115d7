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

use crate::ha::errors::{HaError, HaResult};
use crate::ha::types::{HaEntityState, HaStateUpdate};
use crate::retry::{RetryPolicy, retry_request};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Home Assistant REST API client
#[derive(Debug, Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    client: Client,
    retry: RetryPolicy,
}

impl HomeAssistantClient {
    /// Create a new HA client with custom configuration
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> HaResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HaError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        let base_url: String = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Create HA client from configuration values
    /// Falls back to environment variables if config values are not set
    pub fn from_config(ha_base_url: Option<String>, ha_token: Option<String>) -> HaResult<Self> {
        let base_url = ha_base_url
            .or_else(|| std::env::var("HA_BASE_URL").ok())
            .unwrap_or_else(|| "http://localhost:8123".to_owned());

        let token = ha_token
            .or_else(|| std::env::var("HA_TOKEN").ok())
            .or_else(|| std::env::var("SUPERVISOR_TOKEN").ok())
            .ok_or_else(|| {
                HaError::ConfigError(
                    "HA token not found in config or HA_TOKEN environment variable".to_owned(),
                )
            })?;

        info!("Initializing HA client from configuration: {base_url}");
        Self::new(base_url, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create or update the state of an entity
    pub async fn set_state(
        &self,
        entity_id: &str,
        update: &HaStateUpdate,
    ) -> HaResult<HaEntityState> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        debug!("📤 [HA STATE] {} = '{}'", entity_id, update.state);
        trace!("   Attributes: {:?}", update.attributes);

        let response = retry_request(self.retry, "HA", || async {
            self.client
                .post(&url)
                .bearer_auth(&self.token)
                .json(update)
                .send()
                .await
        })
        .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let state = response.json::<HaEntityState>().await?;
                trace!("✅ [HA STATE] Stored {} at {}", state.entity_id, state.last_updated);
                Ok(state)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [HA ERROR] Authentication failed for entity: {entity_id}");
                Err(HaError::AuthenticationFailed)
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                error!("❌ [HA ERROR] Status {status}: {error_text}");
                Err(HaError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Health check - ping HA API
    pub async fn ping(&self) -> HaResult<bool> {
        let url = format!("{}/api/", self.base_url);
        debug!("Performing health check");

        match self.client.get(&url).bearer_auth(&self.token).send().await {
            Ok(response) => {
                let is_ok = response.status().is_success();
                if is_ok {
                    debug!("Health check passed");
                } else {
                    warn!("Health check failed: status {}", response.status());
                }
                Ok(is_ok)
            }
            Err(e) => {
                warn!("Health check failed: {e}");
                Ok(false)
            }
        }
    }

    /// Set custom retry configuration
    #[must_use]
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.retry = RetryPolicy::new(max_retries, retry_delay);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn test_set_state_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/states/sensor.energyzero_current_price")
            .match_header("authorization", "Bearer test_token")
            .match_body(Matcher::PartialJson(json!({
                "state": "1.23456",
                "attributes": {"unit_of_measurement": "€/m³"}
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "entity_id": "sensor.energyzero_current_price",
                    "state": "1.23456",
                    "attributes": {"unit_of_measurement": "€/m³"},
                    "last_changed": "2025-01-15T10:00:00Z",
                    "last_updated": "2025-01-15T10:00:00Z"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let mut attributes = serde_json::Map::new();
        attributes.insert("unit_of_measurement".to_owned(), json!("€/m³"));
        let state = client
            .set_state(
                "sensor.energyzero_current_price",
                &HaStateUpdate {
                    state: "1.23456".to_owned(),
                    attributes,
                },
            )
            .await
            .unwrap();

        assert_eq!(state.entity_id, "sensor.energyzero_current_price");
        assert_eq!(state.state, "1.23456");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_state_unauthorized() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/states/sensor.test")
            .with_status(401)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "bad_token").unwrap();
        let result = client
            .set_state(
                "sensor.test",
                &HaStateUpdate {
                    state: "unknown".to_owned(),
                    attributes: serde_json::Map::new(),
                },
            )
            .await;

        assert!(matches!(result, Err(HaError::AuthenticationFailed)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ping_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(format!("{}/", server.url()), "test_token").unwrap();
        assert!(client.ping().await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_from_config_prefers_explicit_values() {
        let client = HomeAssistantClient::from_config(
            Some("http://ha.local:8123/".to_owned()),
            Some("token".to_owned()),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://ha.local:8123");
    }
}
