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

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fluxion_gas_types::PriceSeries;

use crate::errors::FetchResult;
use crate::sensor::SensorState;

// ============= FluxION Gas Data Source Traits =============

/// Provider-specific source of hourly gas prices
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    /// Fetch VAT-inclusive hourly prices for the interval `[start, end)`
    async fn fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> FetchResult<PriceSeries>;

    /// Get data source name for logging
    fn name(&self) -> &str;

    /// Attribution string shown on every sensor fed by this source
    fn attribution(&self) -> &str;
}

/// Host entity surface: receives rendered sensor states
#[async_trait]
pub trait StatePublisher: Send + Sync {
    /// Publish the current value and attributes of one sensor
    async fn publish(&self, state: &SensorState) -> Result<()>;

    /// Get publisher name for logging
    fn name(&self) -> &str;
}
