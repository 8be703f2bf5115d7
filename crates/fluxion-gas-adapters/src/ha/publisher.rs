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

//! Sensor state publishers

use anyhow::{Context, Result};
use async_trait::async_trait;
use fluxion_gas_core::{SensorState, StatePublisher};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::ha::client::HomeAssistantClient;
use crate::ha::types::HaStateUpdate;

/// State string Home Assistant shows for a sensor without a value
const UNKNOWN_STATE: &str = "unknown";

/// Build the REST body for a sensor: value plus presentation attributes
pub fn state_update(state: &SensorState) -> HaStateUpdate {
    let mut attributes: Map<String, Value> = state.attributes.clone();
    attributes.insert("friendly_name".to_owned(), json!(state.name));
    attributes.insert(
        "unit_of_measurement".to_owned(),
        json!(state.unit_of_measurement),
    );
    attributes.insert("icon".to_owned(), json!(state.icon));
    attributes.insert("attribution".to_owned(), json!(state.attribution));
    attributes.insert("unique_id".to_owned(), json!(state.unique_id));
    attributes.insert("state_class".to_owned(), json!("measurement"));

    HaStateUpdate {
        state: state
            .native_value
            .map_or_else(|| UNKNOWN_STATE.to_owned(), |v| v.to_string()),
        attributes,
    }
}

/// Publishes sensor states to Home Assistant over its REST API
#[derive(Debug, Clone)]
pub struct HomeAssistantPublisher {
    client: HomeAssistantClient,
}

impl HomeAssistantPublisher {
    pub fn new(client: HomeAssistantClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatePublisher for HomeAssistantPublisher {
    async fn publish(&self, state: &SensorState) -> Result<()> {
        let update = state_update(state);
        self.client
            .set_state(&state.entity_id, &update)
            .await
            .with_context(|| format!("Failed to publish state of {}", state.entity_id))?;
        debug!("📤 Published {} = {}", state.entity_id, update.state);
        Ok(())
    }

    fn name(&self) -> &str {
        "home_assistant"
    }
}

/// Writes sensor states to the log; used when no Home Assistant token is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl StatePublisher for LogPublisher {
    async fn publish(&self, state: &SensorState) -> Result<()> {
        let value = state
            .native_value
            .map_or_else(|| UNKNOWN_STATE.to_owned(), |v| v.to_string());
        info!(
            "📊 {} ({}) = {} {}",
            state.entity_id, state.name, value, state.unit_of_measurement
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
