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

//! End-to-end refresh cycles against a scripted price source

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Europe::Amsterdam;
use fluxion_gas_core::{
    CoordinatorState, FetchError, FetchResult, GasPriceCoordinator, GasPriceSensor, Modifier,
    PriceFetcher, SENSOR_TYPES, UpdateFailed,
};
use fluxion_gas_types::{PricePoint, PriceSeries};
use parking_lot::Mutex;

/// Replays queued responses; each entry is one fetch result
#[derive(Debug, Default)]
struct ScriptedFetcher {
    responses: Mutex<VecDeque<FetchResult<Vec<f64>>>>,
}

impl ScriptedFetcher {
    fn push(&self, response: FetchResult<Vec<f64>>) {
        self.responses.lock().push_back(response);
    }
}

#[async_trait]
impl PriceFetcher for ScriptedFetcher {
    async fn fetch(&self, start: DateTime<Utc>, _end: DateTime<Utc>) -> FetchResult<PriceSeries> {
        let prices = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or(Err(FetchError::MalformedResponse("script exhausted".to_owned())))?;

        // Reported newest first, the way some providers order their payload
        let mut points: Vec<PricePoint> = prices
            .iter()
            .zip(0_i64..)
            .map(|(&price, h)| PricePoint::new(start + TimeDelta::hours(h), price))
            .collect();
        points.reverse();
        Ok(PriceSeries::from_points(points))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn attribution(&self) -> &str {
        "Data provided by Energy Zero API"
    }
}

fn day_start() -> DateTime<Utc> {
    // Local midnight of 2025-03-10 in Amsterdam (CET)
    Utc.with_ymd_and_hms(2025, 3, 9, 23, 0, 0).unwrap()
}

fn ramp(len: i32) -> Vec<f64> {
    (1..=len).map(f64::from).collect()
}

fn coordinator(fetcher: &Arc<ScriptedFetcher>, template: Option<&str>) -> Arc<GasPriceCoordinator> {
    let modifier = Modifier::parse(template, Amsterdam).unwrap();
    Arc::new(GasPriceCoordinator::new(
        "energyzero",
        Arc::clone(fetcher) as Arc<dyn PriceFetcher>,
        modifier,
    ))
}

#[tokio::test]
async fn identity_modifier_preserves_prices_and_order() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.push(Ok(vec![0.812_345_678, 0.8, 0.79]));
    let coordinator = coordinator(&fetcher, None);

    let dataset = coordinator.refresh_at(day_start()).await.unwrap();
    let prices: Vec<f64> = dataset.all().iter().map(|p| p.price).collect();
    assert_eq!(prices, vec![0.81235, 0.8, 0.79]);

    let timestamps: Vec<_> = dataset.all().iter().map(|p| p.timestamp).collect();
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn modifier_sees_each_points_own_hour() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.push(Ok(vec![1.0; 48]));
    let coordinator = coordinator(
        &fetcher,
        Some("{{ current_price + 0.1 if 7 <= now().hour < 23 else current_price }}"),
    );

    let dataset = coordinator
        .refresh_at(day_start() + TimeDelta::hours(12))
        .await
        .unwrap();

    for (hour, point) in dataset.today().iter().enumerate() {
        let expected = if (7..23).contains(&hour) { 1.1 } else { 1.0 };
        assert_eq!(point.price, expected, "local hour {hour}");
    }
    // Tomorrow repeats the same day/night pattern
    assert_eq!(dataset.tomorrow()[6].price, 1.0);
    assert_eq!(dataset.tomorrow()[7].price, 1.1);
}

#[tokio::test]
async fn failed_refresh_keeps_last_good_dataset() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.push(Ok(ramp(24)));
    fetcher.push(Err(FetchError::Status {
        status: 503,
        message: "Service Unavailable".to_owned(),
    }));
    let coordinator = coordinator(&fetcher, Some("current_price * 1.21"));

    let first = coordinator.refresh_at(day_start()).await.unwrap();
    let err = coordinator
        .refresh_at(day_start() + TimeDelta::hours(1))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UpdateFailed::Fetch(FetchError::Status { status: 503, .. })
    ));
    assert!(Arc::ptr_eq(&first, &coordinator.dataset().unwrap()));
    assert_eq!(coordinator.status().state, CoordinatorState::Failed);

    // Sensors keep reporting from the retained dataset
    let mut sensor = GasPriceSensor::new("energyzero", Arc::clone(&coordinator), SENSOR_TYPES[0]);
    let state = sensor.update_at(day_start() + TimeDelta::minutes(90));
    assert_eq!(state.native_value, Some(2.42));
}

#[tokio::test]
async fn non_numeric_template_fails_cycle_without_commit() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.push(Ok(ramp(24)));
    let coordinator = coordinator(&fetcher, Some("current_price > 10"));

    let err = coordinator.refresh_at(day_start()).await.unwrap_err();
    assert!(matches!(err, UpdateFailed::Template { .. }));
    assert!(coordinator.dataset().is_none());
    assert!(!coordinator.status().last_update_success);
}

#[tokio::test]
async fn statistics_over_one_to_twenty_four() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.push(Ok(ramp(24)));
    let coordinator = coordinator(&fetcher, None);
    coordinator.refresh_at(day_start()).await.unwrap();

    let stats = coordinator
        .statistics_at(day_start() + TimeDelta::minutes(5))
        .unwrap();
    assert_eq!(stats.min_price, Some(1.0));
    assert_eq!(stats.time_min, Some(day_start()));
    assert_eq!(stats.max_price, Some(24.0));
    assert_eq!(stats.time_max, Some(day_start() + TimeDelta::hours(23)));
    assert_eq!(stats.avg_price, Some(12.5));
    assert_eq!(stats.prices_today.first().unwrap().time, "2025-03-09 23:00:00+00:00");
}
