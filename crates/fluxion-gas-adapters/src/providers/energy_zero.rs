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

//! EnergyZero public price API

use chrono::{DateTime, Utc};
use fluxion_gas_core::{FetchError, FetchResult, format_api_timestamp};
use fluxion_gas_types::{PricePoint, PriceSeries};
use serde::Deserialize;

use super::parse_timestamp;

pub const ENDPOINT: &str = "https://api.energyzero.nl/v1/energyprices";
pub const ATTRIBUTION: &str = "Data provided by Energy Zero API";

/// Hourly granularity
const INTERVAL_HOUR: &str = "4";
/// Gas
const USAGE_TYPE_GAS: &str = "3";

pub(crate) const HEADERS: &[(&str, &str)] = &[
    ("accept", "*/*"),
    ("accept-language", "en-US,en;q=0.9"),
    ("cache-control", "no-cache"),
    ("pragma", "no-cache"),
    ("origin", "https://www.mijndomein.nl"),
    ("referer", "https://www.mijndomein.nl/"),
];

#[derive(Debug, Deserialize)]
struct PricesResponse {
    #[serde(rename = "Prices")]
    prices: Vec<PriceEntry>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(rename = "readingDate")]
    reading_date: String,
    price: f64,
}

pub(crate) fn query(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(&'static str, String)> {
    vec![
        ("fromDate", format_api_timestamp(start)),
        ("tillDate", format_api_timestamp(end)),
        ("interval", INTERVAL_HOUR.to_owned()),
        ("usageType", USAGE_TYPE_GAS.to_owned()),
        ("inclBtw", "true".to_owned()),
    ]
}

pub(crate) fn parse(body: &str) -> FetchResult<PriceSeries> {
    let response: PricesResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedResponse(format!("EnergyZero: {e}")))?;

    let points = response
        .prices
        .into_iter()
        .map(|entry| Ok(PricePoint::new(parse_timestamp(&entry.reading_date)?, entry.price)))
        .collect::<FetchResult<Vec<_>>>()?;

    Ok(PriceSeries::from_points(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_query_parameters() {
        let start = Utc.with_ymd_and_hms(2025, 1, 14, 23, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 16, 22, 0, 0).unwrap();

        let query = query(start, end);
        assert_eq!(query[0], ("fromDate", "2025-01-14T23:00:00Z".to_owned()));
        assert_eq!(query[1], ("tillDate", "2025-01-16T22:00:00Z".to_owned()));
        assert!(query.contains(&("interval", "4".to_owned())));
        assert!(query.contains(&("usageType", "3".to_owned())));
        assert!(query.contains(&("inclBtw", "true".to_owned())));
    }

    #[test]
    fn test_parse_sorts_and_normalizes() {
        let body = r#"{
            "Prices": [
                {"price": 1.2, "readingDate": "2025-01-15T00:00:00Z"},
                {"price": 1.1, "readingDate": "2025-01-14T23:00:00Z"}
            ],
            "intervalType": 4,
            "average": 1.15
        }"#;

        let series = parse(body).unwrap();
        assert_eq!(series.len(), 2);
        let first = series.first().unwrap();
        assert_eq!(first.timestamp, Utc.with_ymd_and_hms(2025, 1, 14, 23, 0, 0).unwrap());
        assert_eq!(first.price, 1.1);
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(matches!(
            parse(r#"[{"Timestamp": "2025-01-14T23:00:00Z", "TariffUsage": 1.0}]"#),
            Err(FetchError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse(r#"{"Prices": [{"price": 1.0, "readingDate": "yesterday"}]}"#),
            Err(FetchError::MalformedResponse(_))
        ));
    }
}
