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

//! Upstream gas price providers
//!
//! Both providers are served by one [`ProviderClient`]; a [`Provider`] value selects
//! the endpoint, request headers, query parameters and response shape.

pub mod client;
pub mod easy_energy;
pub mod energy_zero;

pub use client::ProviderClient;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use fluxion_gas_core::{FetchError, FetchResult};
use fluxion_gas_types::PriceSeries;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[serde(alias = "energyzero")]
    EnergyZero,
    #[serde(alias = "easyenergy")]
    EasyEnergy,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::EnergyZero, Provider::EasyEnergy];

    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::EnergyZero => energy_zero::ENDPOINT,
            Self::EasyEnergy => easy_energy::ENDPOINT,
        }
    }

    pub fn attribution(self) -> &'static str {
        match self {
            Self::EnergyZero => energy_zero::ATTRIBUTION,
            Self::EasyEnergy => easy_energy::ATTRIBUTION,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::EnergyZero => "EnergyZero",
            Self::EasyEnergy => "EasyEnergy",
        }
    }

    /// Instance id used when the configuration does not name one
    pub fn default_instance_id(self) -> &'static str {
        match self {
            Self::EnergyZero => "energyzero",
            Self::EasyEnergy => "easyenergy",
        }
    }

    pub(crate) fn headers(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::EnergyZero => energy_zero::HEADERS,
            Self::EasyEnergy => easy_energy::HEADERS,
        }
    }

    pub(crate) fn query(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(&'static str, String)> {
        match self {
            Self::EnergyZero => energy_zero::query(start, end),
            Self::EasyEnergy => easy_energy::query(start, end),
        }
    }

    pub(crate) fn parse(self, body: &str) -> FetchResult<PriceSeries> {
        match self {
            Self::EnergyZero => energy_zero::parse(body),
            Self::EasyEnergy => easy_energy::parse(body),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "energy_zero" | "energyzero" => Ok(Self::EnergyZero),
            "easy_energy" | "easyenergy" => Ok(Self::EasyEnergy),
            other => Err(format!(
                "unknown provider '{other}', expected 'energy_zero' or 'easy_energy'"
            )),
        }
    }
}

/// Parse a provider timestamp into UTC.
///
/// Accepts RFC 3339 with `Z` or an offset; a timestamp without offset is read as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> FetchResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| FetchError::MalformedResponse(format!("invalid timestamp '{raw}': {e}")))
}
