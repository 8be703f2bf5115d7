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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pricing::PricePoint;

/// Display format for timestamps in price lists, e.g. `2025-01-15 06:00:00+00:00`
pub const PRICE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// `{time, price}` record used in the list attributes of a sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedPrice {
    pub time: String,
    pub price: f64,
}

impl From<&PricePoint> for TimestampedPrice {
    fn from(point: &PricePoint) -> Self {
        Self {
            time: point.timestamp.format(PRICE_TIME_FORMAT).to_string(),
            price: point.price,
        }
    }
}

/// Statistics derived from a processed dataset at a given instant.
///
/// Recomputed on every read; min/max/avg cover today's prices only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStatistics {
    pub current_price: Option<f64>,
    pub next_hour_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_price: Option<f64>,
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
    pub prices_today: Vec<TimestampedPrice>,
    pub prices_tomorrow: Vec<TimestampedPrice>,
    pub prices: Vec<TimestampedPrice>,
}
