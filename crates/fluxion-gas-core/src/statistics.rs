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

//! Statistics derived from a processed dataset
//!
//! All functions are pure; the coordinator calls [`derive_statistics`] on every read.

use chrono::{DateTime, TimeDelta, Utc};
use fluxion_gas_types::{PricePoint, PriceStatistics, ProcessedDataset, TimestampedPrice};

use crate::modifier::round_price;

/// Price of the hour containing `now` (`h <= now < h + 1h`)
pub fn current_price(points: &[PricePoint], now: DateTime<Utc>) -> Option<f64> {
    points.iter().find(|p| p.covers(now)).map(|p| p.price)
}

/// Price of the hour starting next (`h - 1h <= now < h`)
pub fn next_hour_price(points: &[PricePoint], now: DateTime<Utc>) -> Option<f64> {
    points
        .iter()
        .find(|p| p.timestamp - TimeDelta::hours(1) <= now && now < p.timestamp)
        .map(|p| p.price)
}

/// Cheapest point; on ties the earliest wins
pub fn min_point(points: &[PricePoint]) -> Option<&PricePoint> {
    let mut best: Option<&PricePoint> = None;
    for point in points {
        if best.is_none_or(|b| point.price < b.price) {
            best = Some(point);
        }
    }
    best
}

/// Most expensive point; on ties the earliest wins
pub fn max_point(points: &[PricePoint]) -> Option<&PricePoint> {
    let mut best: Option<&PricePoint> = None;
    for point in points {
        if best.is_none_or(|b| point.price > b.price) {
            best = Some(point);
        }
    }
    best
}

/// Mean price rounded to 5 decimals, `None` for an empty slice
#[expect(clippy::cast_precision_loss)]
pub fn average_price(points: &[PricePoint]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    let sum: f64 = points.iter().map(|p| p.price).sum();
    Some(round_price(sum / points.len() as f64))
}

pub fn timestamped_prices(points: &[PricePoint]) -> Vec<TimestampedPrice> {
    points.iter().map(TimestampedPrice::from).collect()
}

/// Compute every statistic for `dataset` as seen at `now`
pub fn derive_statistics(dataset: &ProcessedDataset, now: DateTime<Utc>) -> PriceStatistics {
    let all = dataset.all();
    let today = dataset.today();
    let min = min_point(today);
    let max = max_point(today);

    PriceStatistics {
        current_price: current_price(all, now),
        next_hour_price: next_hour_price(all, now),
        min_price: min.map(|p| p.price),
        max_price: max.map(|p| p.price),
        avg_price: average_price(today),
        time_min: min.map(|p| p.timestamp),
        time_max: max.map(|p| p.timestamp),
        prices_today: timestamped_prices(today),
        prices_tomorrow: timestamped_prices(dataset.tomorrow()),
        prices: timestamped_prices(all),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fluxion_gas_types::PriceSeries;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 14, 23, 0, 0).unwrap()
    }

    fn series(prices: &[f64]) -> PriceSeries {
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| {
                PricePoint::new(start() + TimeDelta::hours(i64::try_from(i).unwrap()), price)
            })
            .collect()
    }

    #[test]
    fn test_one_to_twenty_four_round_trip() {
        let prices: Vec<f64> = (1..=24).map(f64::from).collect();
        let dataset = ProcessedDataset::new(series(&prices), start());
        let now = start() + TimeDelta::minutes(30);

        let stats = derive_statistics(&dataset, now);
        assert_eq!(stats.min_price, Some(1.0));
        assert_eq!(stats.time_min, Some(start()));
        assert_eq!(stats.max_price, Some(24.0));
        assert_eq!(stats.time_max, Some(start() + TimeDelta::hours(23)));
        assert_eq!(stats.avg_price, Some(12.5));
        assert_eq!(stats.current_price, Some(1.0));
        assert_eq!(stats.next_hour_price, Some(2.0));
        assert_eq!(stats.prices_today.len(), 24);
        assert!(stats.prices_tomorrow.is_empty());
    }

    #[test]
    fn test_ties_keep_first_occurrence() {
        let points = series(&[2.0, 1.0, 3.0, 1.0, 3.0]);
        let min = min_point(points.points()).unwrap();
        let max = max_point(points.points()).unwrap();
        assert_eq!(min.timestamp, start() + TimeDelta::hours(1));
        assert_eq!(max.timestamp, start() + TimeDelta::hours(2));
    }

    #[test]
    fn test_current_price_boundaries() {
        let points = series(&[1.0, 2.0]);
        let points = points.points();

        assert_eq!(current_price(points, start()), Some(1.0));
        assert_eq!(
            current_price(points, start() + TimeDelta::minutes(59)),
            Some(1.0)
        );
        assert_eq!(current_price(points, start() + TimeDelta::hours(1)), Some(2.0));
        assert_eq!(current_price(points, start() + TimeDelta::hours(2)), None);
        assert_eq!(current_price(points, start() - TimeDelta::seconds(1)), None);
    }

    #[test]
    fn test_next_hour_price_boundaries() {
        let points = series(&[1.0, 2.0]);
        let points = points.points();

        // One hour before the first point, the first point is "next"
        assert_eq!(
            next_hour_price(points, start() - TimeDelta::hours(1)),
            Some(1.0)
        );
        assert_eq!(next_hour_price(points, start()), Some(2.0));
        assert_eq!(next_hour_price(points, start() + TimeDelta::hours(1)), None);
    }

    #[test]
    fn test_average_is_rounded_and_bounded() {
        let points = series(&[0.1, 0.2, 0.25]);
        let avg = average_price(points.points()).unwrap();
        assert_eq!(avg, 0.18333);

        let min = min_point(points.points()).unwrap().price;
        let max = max_point(points.points()).unwrap().price;
        assert!(min <= avg && avg <= max);
    }

    #[test]
    fn test_empty_dataset_has_no_statistics() {
        let dataset = ProcessedDataset::new(PriceSeries::new(), start());
        let stats = derive_statistics(&dataset, start());
        assert_eq!(stats.current_price, None);
        assert_eq!(stats.min_price, None);
        assert_eq!(stats.avg_price, None);
        assert!(stats.prices.is_empty());
    }

    #[test]
    fn test_tomorrow_partition() {
        let prices: Vec<f64> = (0..48).map(f64::from).collect();
        let dataset = ProcessedDataset::new(series(&prices), start());
        let stats = derive_statistics(&dataset, start() + TimeDelta::hours(30));

        assert_eq!(stats.prices_today.len(), 24);
        assert_eq!(stats.prices_tomorrow.len(), 24);
        assert_eq!(stats.prices.len(), 48);
        assert_eq!(stats.current_price, Some(30.0));
        // min/max only cover today
        assert_eq!(stats.max_price, Some(23.0));
    }
}
