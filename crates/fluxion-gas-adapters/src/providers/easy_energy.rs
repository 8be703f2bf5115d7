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

//! EasyEnergy LEBA tariff API

use chrono::{DateTime, Utc};
use fluxion_gas_core::{FetchError, FetchResult, format_api_timestamp};
use fluxion_gas_types::{PricePoint, PriceSeries};
use serde::Deserialize;

use super::parse_timestamp;

pub const ENDPOINT: &str = "https://mijn.easyenergy.com/nl/api/tariff/getlebatariffs";
pub const ATTRIBUTION: &str = "Data provided by Easy Energy API";

pub(crate) const HEADERS: &[(&str, &str)] = &[
    ("accept", "*/*"),
    ("accept-language", "en-US,en;q=0.9"),
    ("cache-control", "no-cache"),
    ("pragma", "no-cache"),
];

#[derive(Debug, Deserialize)]
struct TariffEntry {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TariffUsage")]
    tariff_usage: f64,
}

pub(crate) fn query(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(&'static str, String)> {
    vec![
        ("startTimestamp", format_api_timestamp(start)),
        ("endTimestamp", format_api_timestamp(end)),
        ("includeVat", "true".to_owned()),
    ]
}

pub(crate) fn parse(body: &str) -> FetchResult<PriceSeries> {
    let entries: Vec<TariffEntry> = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("EasyEnergy: {e}")))?;

    let mut series = PriceSeries::new();
    for entry in entries {
        series.insert(parse_timestamp(&entry.timestamp)?, entry.tariff_usage);
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_query_parameters() {
        let start = Utc.with_ymd_and_hms(2025, 6, 30, 22, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 7, 2, 21, 0, 0).unwrap();

        assert_eq!(
            query(start, end),
            vec![
                ("startTimestamp", "2025-06-30T22:00:00Z".to_owned()),
                ("endTimestamp", "2025-07-02T21:00:00Z".to_owned()),
                ("includeVat", "true".to_owned()),
            ]
        );
    }

    #[test]
    fn test_parse_offsets_and_duplicates() {
        let body = r#"[
            {"Timestamp": "2025-07-01T00:00:00+02:00", "SupplierId": 0, "TariffUsage": 0.9, "TariffReturn": 0.8},
            {"Timestamp": "2025-06-30T23:00:00+00:00", "SupplierId": 0, "TariffUsage": 1.0, "TariffReturn": 0.8},
            {"Timestamp": "2025-06-30T23:00:00Z", "SupplierId": 0, "TariffUsage": 1.05, "TariffReturn": 0.8}
        ]"#;

        let series = parse(body).unwrap();
        let points = series.points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, Utc.with_ymd_and_hms(2025, 6, 30, 22, 0, 0).unwrap());
        assert_eq!(points[0].price, 0.9);
        // Last value reported for an hour wins
        assert_eq!(points[1].price, 1.05);
    }

    #[test]
    fn test_parse_rejects_object_body() {
        assert!(matches!(
            parse(r#"{"Prices": []}"#),
            Err(FetchError::MalformedResponse(_))
        ));
    }
}
