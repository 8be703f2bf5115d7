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

//! Gas price coordinator
//!
//! One coordinator per configured instance. Each refresh fetches the 47-hour window
//! starting at local midnight, runs the modifier over every point with `now()` set to
//! that point's hour, and swaps in the new [`ProcessedDataset`] in one step. A failed
//! refresh leaves the previous dataset in place.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use fluxion_gas_types::{PriceStatistics, ProcessedDataset};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::errors::UpdateFailed;
use crate::modifier::Modifier;
use crate::scheduling::fetch_window;
use crate::statistics::derive_statistics;
use crate::traits::PriceFetcher;

/// Default time between refreshes
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(3600);

/// Where the coordinator is in its refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinatorState {
    #[default]
    Idle,
    Fetching,
    Transforming,
    Ready,
    Failed,
}

/// Outcome bookkeeping of the most recent refresh
#[derive(Debug, Clone, Default)]
pub struct RefreshStatus {
    pub state: CoordinatorState,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub last_refresh_at: Option<DateTime<Utc>>,
}

pub struct GasPriceCoordinator {
    name: String,
    fetcher: Arc<dyn PriceFetcher>,
    modifier: Modifier,
    update_interval: Duration,
    dataset: RwLock<Option<Arc<ProcessedDataset>>>,
    status: RwLock<RefreshStatus>,
}

impl fmt::Debug for GasPriceCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GasPriceCoordinator")
            .field("name", &self.name)
            .field("fetcher", &self.fetcher.name())
            .field("modifier", &self.modifier.source())
            .field("update_interval", &self.update_interval)
            .field("status", &*self.status.read())
            .finish_non_exhaustive()
    }
}

impl GasPriceCoordinator {
    pub fn new(name: impl Into<String>, fetcher: Arc<dyn PriceFetcher>, modifier: Modifier) -> Self {
        Self {
            name: name.into(),
            fetcher,
            modifier,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            dataset: RwLock::new(None),
            status: RwLock::new(RefreshStatus::default()),
        }
    }

    #[must_use]
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timezone(&self) -> Tz {
        self.modifier.timezone()
    }

    pub fn modifier(&self) -> &Modifier {
        &self.modifier
    }

    pub fn attribution(&self) -> &str {
        self.fetcher.attribution()
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Run one refresh cycle for the current time
    pub async fn refresh(&self) -> Result<Arc<ProcessedDataset>, UpdateFailed> {
        self.refresh_at(Utc::now()).await
    }

    /// Run one refresh cycle as if the clock read `now`
    pub async fn refresh_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Arc<ProcessedDataset>, UpdateFailed> {
        let (start, end) = fetch_window(now, self.timezone());

        self.set_state(CoordinatorState::Fetching);
        debug!(
            "⛽ [{}] Fetching gas prices from {} ({} → {})",
            self.name,
            self.fetcher.name(),
            start,
            end
        );

        let raw = match self.fetcher.fetch(start, end).await {
            Ok(series) => series,
            Err(e) => return Err(self.fail(now, UpdateFailed::Fetch(e))),
        };

        self.set_state(CoordinatorState::Transforming);
        debug!(
            "🧮 [{}] Applying modifier '{}' to {} prices",
            self.name,
            self.modifier.source(),
            raw.len()
        );

        let adjusted = raw.try_map_prices(|point| {
            self.modifier
                .evaluate(point.price, point.timestamp)
                .map_err(|source| UpdateFailed::Template {
                    timestamp: point.timestamp,
                    source,
                })
        });
        let adjusted = match adjusted {
            Ok(series) => series,
            Err(e) => return Err(self.fail(now, e)),
        };

        let dataset = Arc::new(ProcessedDataset::new(adjusted, now));
        *self.dataset.write() = Some(Arc::clone(&dataset));

        {
            let mut status = self.status.write();
            status.state = CoordinatorState::Ready;
            status.last_update_success = true;
            status.last_error = None;
            status.last_refresh_at = Some(now);
        }

        info!(
            "✅ [{}] Gas prices updated: {} today, {} tomorrow",
            self.name,
            dataset.today().len(),
            dataset.tomorrow().len()
        );
        Ok(dataset)
    }

    /// Initial refresh; setup must not proceed when it fails
    pub async fn first_refresh(&self) -> Result<Arc<ProcessedDataset>, UpdateFailed> {
        info!("⛽ [{}] Running first refresh", self.name);
        self.refresh().await
    }

    /// Latest committed dataset, if any refresh has succeeded
    pub fn dataset(&self) -> Option<Arc<ProcessedDataset>> {
        self.dataset.read().clone()
    }

    pub fn statistics_at(&self, now: DateTime<Utc>) -> Option<PriceStatistics> {
        self.dataset().map(|dataset| derive_statistics(&dataset, now))
    }

    pub fn statistics(&self) -> Option<PriceStatistics> {
        self.statistics_at(Utc::now())
    }

    pub fn status(&self) -> RefreshStatus {
        self.status.read().clone()
    }

    /// Refresh every `update_interval` until the task is aborted.
    ///
    /// The first tick fires one interval from now; the initial refresh is the
    /// caller's job.
    pub async fn run_periodic(self: Arc<Self>) {
        let start = tokio::time::Instant::now() + self.update_interval;
        let mut interval = tokio::time::interval_at(start, self.update_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            "🔄 [{}] Periodic refresh every {}s",
            self.name,
            self.update_interval.as_secs()
        );

        loop {
            interval.tick().await;
            if let Err(e) = self.refresh().await {
                error!("❌ [{}] Scheduled refresh failed: {e}", self.name);
            }
        }
    }

    fn set_state(&self, state: CoordinatorState) {
        self.status.write().state = state;
    }

    fn fail(&self, now: DateTime<Utc>, error: UpdateFailed) -> UpdateFailed {
        warn!("⚠️ [{}] {error}", self.name);

        let mut status = self.status.write();
        status.state = CoordinatorState::Failed;
        status.last_update_success = false;
        status.last_error = Some(error.to_string());
        status.last_refresh_at = Some(now);
        error
    }
}
