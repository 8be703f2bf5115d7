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

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of hourly points that make up one day of the dataset
pub const HOURS_PER_DAY: usize = 24;

// ============= Pricing Data (FluxION Gas) =============

/// A single hourly price as reported by a provider (or after the modifier ran)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Start of the hour this price applies to
    pub timestamp: DateTime<Utc>,

    /// Price for this hour (EUR/m³)
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self { timestamp, price }
    }

    /// End of the hour this point covers (exclusive)
    pub fn end(&self) -> DateTime<Utc> {
        self.timestamp + TimeDelta::hours(1)
    }

    /// True when `instant` lies in `[timestamp, timestamp + 1h)`
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        self.timestamp <= instant && instant < self.end()
    }
}

/// Ordered hourly price series with unique, ascending timestamps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from points in any order.
    ///
    /// When a timestamp appears more than once the value reported last wins,
    /// matching how providers occasionally repeat a record on DST boundaries.
    pub fn from_points(points: impl IntoIterator<Item = PricePoint>) -> Self {
        let by_time: BTreeMap<DateTime<Utc>, f64> = points
            .into_iter()
            .map(|point| (point.timestamp, point.price))
            .collect();

        Self {
            points: by_time
                .into_iter()
                .map(|(timestamp, price)| PricePoint { timestamp, price })
                .collect(),
        }
    }

    /// Insert or replace the price for `timestamp`, keeping the order intact
    pub fn insert(&mut self, timestamp: DateTime<Utc>, price: f64) {
        match self
            .points
            .binary_search_by(|point| point.timestamp.cmp(&timestamp))
        {
            Ok(idx) => self.points[idx].price = price,
            Err(idx) => self.points.insert(idx, PricePoint { timestamp, price }),
        }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PricePoint> {
        self.points.iter()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Produce a new series with every price replaced by `f(point)`.
    ///
    /// Stops at the first error, so a caller never sees a half-transformed series.
    pub fn try_map_prices<E>(
        &self,
        mut f: impl FnMut(&PricePoint) -> Result<f64, E>,
    ) -> Result<PriceSeries, E> {
        let points = self
            .points
            .iter()
            .map(|point| f(point).map(|price| PricePoint::new(point.timestamp, price)))
            .collect::<Result<Vec<_>, E>>()?;

        Ok(Self { points })
    }
}

impl FromIterator<PricePoint> for PriceSeries {
    fn from_iter<I: IntoIterator<Item = PricePoint>>(iter: I) -> Self {
        Self::from_points(iter)
    }
}

impl<'a> IntoIterator for &'a PriceSeries {
    type Item = &'a PricePoint;
    type IntoIter = std::slice::Iter<'a, PricePoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Committed result of one coordinator refresh: modifier-adjusted prices.
///
/// Replaced wholesale on every refresh and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedDataset {
    all: Vec<PricePoint>,
    fetched_at: DateTime<Utc>,
}

impl ProcessedDataset {
    pub fn new(series: PriceSeries, fetched_at: DateTime<Utc>) -> Self {
        Self {
            all: series.points,
            fetched_at,
        }
    }

    /// Every adjusted price in the fetch window
    pub fn all(&self) -> &[PricePoint] {
        &self.all
    }

    /// First 24 points of the window
    pub fn today(&self) -> &[PricePoint] {
        let end = self.all.len().min(HOURS_PER_DAY);
        &self.all[..end]
    }

    /// Points 24..48 of the window (empty until the day-ahead prices are published)
    pub fn tomorrow(&self) -> &[PricePoint] {
        let start = self.all.len().min(HOURS_PER_DAY);
        let end = self.all.len().min(2 * HOURS_PER_DAY);
        &self.all[start..end]
    }

    /// When the refresh that produced this dataset ran
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 14, 23, 0, 0).unwrap() + TimeDelta::hours(h)
    }

    fn series_of(n: usize) -> PriceSeries {
        (0..n)
            .map(|i| PricePoint::new(hour(i as i64), i as f64))
            .collect()
    }

    #[test]
    fn test_from_points_sorts_and_deduplicates() {
        let series = PriceSeries::from_points(vec![
            PricePoint::new(hour(2), 2.0),
            PricePoint::new(hour(0), 0.0),
            PricePoint::new(hour(1), 1.0),
            PricePoint::new(hour(0), 0.5),
        ]);

        assert_eq!(series.len(), 3);
        assert_eq!(series.points()[0], PricePoint::new(hour(0), 0.5));
        assert!(
            series
                .points()
                .windows(2)
                .all(|w| w[0].timestamp < w[1].timestamp)
        );
    }

    #[test]
    fn test_insert_replaces_existing_timestamp() {
        let mut series = series_of(3);
        series.insert(hour(1), 9.0);
        series.insert(hour(5), 5.0);

        assert_eq!(series.len(), 4);
        assert_eq!(series.points()[1].price, 9.0);
        assert_eq!(series.last().unwrap().timestamp, hour(5));
    }

    #[test]
    fn test_covers_is_half_open() {
        let point = PricePoint::new(hour(0), 1.0);
        assert!(point.covers(hour(0)));
        assert!(point.covers(hour(0) + TimeDelta::minutes(59)));
        assert!(!point.covers(hour(1)));
        assert!(!point.covers(hour(0) - TimeDelta::seconds(1)));
    }

    #[test]
    fn test_try_map_prices_stops_on_error() {
        let series = series_of(4);
        let result: Result<PriceSeries, String> = series.try_map_prices(|p| {
            if p.price >= 2.0 {
                Err(format!("bad price at {}", p.timestamp))
            } else {
                Ok(p.price * 2.0)
            }
        });
        assert!(result.is_err());

        let doubled: Result<PriceSeries, String> = series.try_map_prices(|p| Ok(p.price * 2.0));
        let doubled = doubled.unwrap();
        assert_eq!(doubled.points()[3].price, 6.0);
        assert_eq!(doubled.points()[3].timestamp, hour(3));
    }

    #[test]
    fn test_partition_sizes() {
        for n in [0, 1, 23, 24, 25, 47, 48] {
            let dataset = ProcessedDataset::new(series_of(n), Utc::now());
            assert_eq!(dataset.today().len(), n.min(24), "today for n={n}");
            assert_eq!(
                dataset.tomorrow().len(),
                n.saturating_sub(24).min(24),
                "tomorrow for n={n}"
            );
            assert_eq!(dataset.all().len(), n);
        }
    }

    #[test]
    fn test_partition_preserves_order() {
        let dataset = ProcessedDataset::new(series_of(48), Utc::now());
        assert_eq!(dataset.today()[0].timestamp, hour(0));
        assert_eq!(dataset.today()[23].timestamp, hour(23));
        assert_eq!(dataset.tomorrow()[0].timestamp, hour(24));
        assert_eq!(dataset.tomorrow()[23].price, 47.0);
    }
}
