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

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fluxion_gas_types::PriceStatistics;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::coordinator::GasPriceCoordinator;
use crate::errors::ProjectionError;
use crate::scheduling::next_hour_boundary;

pub const UNIT_OF_MEASUREMENT: &str = "€/m³";
pub const ICON: &str = "mdi:currency-eur";

/// Attribute keys never copied into the attribute bag
const EXCLUDED_ATTRIBUTES: [&str; 2] = ["time_min", "time_max"];

/// Static description of one sensor type
#[derive(Debug, Clone, Copy)]
pub struct SensorDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub value_fn: fn(&PriceStatistics) -> Result<f64, ProjectionError>,
}

fn current_price(stats: &PriceStatistics) -> Result<f64, ProjectionError> {
    stats
        .current_price
        .ok_or(ProjectionError::Missing("current_price"))
}

fn next_hour_price(stats: &PriceStatistics) -> Result<f64, ProjectionError> {
    stats
        .next_hour_price
        .ok_or(ProjectionError::Missing("next_hour_price"))
}

fn min_price(stats: &PriceStatistics) -> Result<f64, ProjectionError> {
    stats.min_price.ok_or(ProjectionError::Missing("min_price"))
}

fn max_price(stats: &PriceStatistics) -> Result<f64, ProjectionError> {
    stats.max_price.ok_or(ProjectionError::Missing("max_price"))
}

fn avg_price(stats: &PriceStatistics) -> Result<f64, ProjectionError> {
    stats.avg_price.ok_or(ProjectionError::Missing("avg_price"))
}

pub const SENSOR_TYPES: [SensorDescription; 5] = [
    SensorDescription {
        key: "current_price",
        name: "Current gas market price",
        value_fn: current_price,
    },
    SensorDescription {
        key: "next_hour_price",
        name: "Next hour gas market price",
        value_fn: next_hour_price,
    },
    SensorDescription {
        key: "min_price",
        name: "Lowest gas price today",
        value_fn: min_price,
    },
    SensorDescription {
        key: "max_price",
        name: "Highest gas price today",
        value_fn: max_price,
    },
    SensorDescription {
        key: "avg_price",
        name: "Average gas price today",
        value_fn: avg_price,
    },
];

/// What a sensor exposes to the host after an update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorState {
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    pub native_value: Option<f64>,
    pub unit_of_measurement: &'static str,
    pub attribution: String,
    pub icon: &'static str,
    pub attributes: Map<String, Value>,
    pub next_update: DateTime<Utc>,
}

/// A numeric sensor projecting one statistic from a coordinator
#[derive(Debug, Clone)]
pub struct GasPriceSensor {
    coordinator: Arc<GasPriceCoordinator>,
    description: SensorDescription,
    state: SensorState,
}

impl GasPriceSensor {
    pub fn new(
        instance_id: &str,
        coordinator: Arc<GasPriceCoordinator>,
        description: SensorDescription,
    ) -> Self {
        let state = SensorState {
            entity_id: format!("sensor.{instance_id}_{}", description.key),
            unique_id: format!("{instance_id}.{}", description.key),
            name: description.name.to_owned(),
            native_value: None,
            unit_of_measurement: UNIT_OF_MEASUREMENT,
            attribution: coordinator.attribution().to_owned(),
            icon: ICON,
            attributes: Map::new(),
            next_update: next_hour_boundary(Utc::now()),
        };

        Self {
            coordinator,
            description,
            state,
        }
    }

    pub fn description(&self) -> &SensorDescription {
        &self.description
    }

    pub fn state(&self) -> &SensorState {
        &self.state
    }

    pub fn update(&mut self) -> &SensorState {
        self.update_at(Utc::now())
    }

    /// Re-read statistics as of `now` and refresh value and attributes
    pub fn update_at(&mut self, now: DateTime<Utc>) -> &SensorState {
        let stats = self.coordinator.statistics_at(now);
        let value = stats
            .as_ref()
            .ok_or(ProjectionError::NoData)
            .and_then(|stats| (self.description.value_fn)(stats));

        self.state.native_value = match value {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("📉 {}: {e}", self.state.entity_id);
                None
            }
        };
        self.state.attributes = stats.as_ref().map(attribute_bag).unwrap_or_default();
        self.state.next_update = next_hour_boundary(now);
        &self.state
    }
}

/// Every statistic except the min/max timestamps
fn attribute_bag(stats: &PriceStatistics) -> Map<String, Value> {
    match serde_json::to_value(stats) {
        Ok(Value::Object(mut map)) => {
            for key in EXCLUDED_ATTRIBUTES {
                map.remove(key);
            }
            map
        }
        _ => Map::new(),
    }
}
