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

//! Instance lifecycle: setup, options update and teardown of configured price sources

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::GasPriceCoordinator;
use crate::errors::{RegistryError, RegistryResult};
use crate::modifier::{Modifier, validate_modifier_option};
use crate::scheduling::{duration_until, next_hour_boundary};
use crate::sensor::{GasPriceSensor, SENSOR_TYPES, SensorState};
use crate::traits::{PriceFetcher, StatePublisher};

/// User-editable options of one instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceOptions {
    /// Price modifier template; `None` means the identity template
    #[serde(default, alias = "modifyer", skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,
}

/// A running instance: its coordinator, sensors and background tasks
pub struct InstanceHandle {
    id: String,
    coordinator: Arc<GasPriceCoordinator>,
    sensors: Arc<Mutex<Vec<GasPriceSensor>>>,
    fetcher: Arc<dyn PriceFetcher>,
    options: InstanceOptions,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("id", &self.id)
            .field("coordinator", &self.coordinator)
            .field("options", &self.options)
            .field("tasks", &self.tasks.lock().len())
            .finish_non_exhaustive()
    }
}

impl InstanceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn coordinator(&self) -> &Arc<GasPriceCoordinator> {
        &self.coordinator
    }

    pub fn options(&self) -> &InstanceOptions {
        &self.options
    }

    /// Snapshot of every sensor's last published state
    pub fn sensor_states(&self) -> Vec<SensorState> {
        self.sensors.lock().iter().map(|s| s.state().clone()).collect()
    }

    /// Update every sensor as of `now` and return their new states
    pub fn update_sensors(&self, now: DateTime<Utc>) -> Vec<SensorState> {
        update_all(&self.sensors, now)
    }

    /// Start the hourly refresh loop and the hour-aligned sensor loop
    fn spawn_background(&self, publisher: Arc<dyn StatePublisher>) {
        let coordinator_task = tokio::spawn(Arc::clone(&self.coordinator).run_periodic());

        let sensors = Arc::clone(&self.sensors);
        let id = self.id.clone();
        let sensor_task = tokio::spawn(async move {
            let mut next = next_hour_boundary(Utc::now());
            loop {
                debug!("💤 [{id}] Sensors sleeping until {next}");
                tokio::time::sleep(duration_until(next, Utc::now())).await;

                let states = update_all(&sensors, Utc::now());
                publish_all(publisher.as_ref(), &states).await;

                // An early wake-up must not publish the same hour twice
                next = next_hour_boundary(Utc::now().max(next));
            }
        });

        self.tasks.lock().extend([coordinator_task, sensor_task]);
    }

    /// Abort the background tasks
    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        if !tasks.is_empty() {
            debug!("🛑 [{}] Stopping {} background tasks", self.id, tasks.len());
        }
        for task in tasks {
            task.abort();
        }
    }
}

impl Drop for InstanceHandle {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

fn update_all(sensors: &Mutex<Vec<GasPriceSensor>>, now: DateTime<Utc>) -> Vec<SensorState> {
    sensors
        .lock()
        .iter_mut()
        .map(|sensor| sensor.update_at(now).clone())
        .collect()
}

async fn publish_all(publisher: &dyn StatePublisher, states: &[SensorState]) {
    for state in states {
        if let Err(e) = publisher.publish(state).await {
            warn!(
                "⚠️ Failed to publish {} via {}: {e:#}",
                state.entity_id,
                publisher.name()
            );
        }
    }
}

/// All configured instances, keyed by instance id
pub struct InstanceRegistry {
    timezone: Tz,
    publisher: Arc<dyn StatePublisher>,
    instances: RwLock<HashMap<String, Arc<InstanceHandle>>>,
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("timezone", &self.timezone)
            .field("publisher", &self.publisher.name())
            .field("instances", &self.instance_ids())
            .finish()
    }
}

impl InstanceRegistry {
    pub fn new(timezone: Tz, publisher: Arc<dyn StatePublisher>) -> Self {
        Self {
            timezone,
            publisher,
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Set up an instance: first refresh, sensors, initial publish, background tasks.
    ///
    /// Fails with [`RegistryError::NotReady`] when the first refresh fails; nothing is
    /// registered in that case.
    pub async fn setup(
        &self,
        id: &str,
        fetcher: Arc<dyn PriceFetcher>,
        options: InstanceOptions,
    ) -> RegistryResult<Arc<InstanceHandle>> {
        if self.instances.read().contains_key(id) {
            return Err(RegistryError::AlreadyConfigured(id.to_owned()));
        }

        let handle = self.build(id, fetcher, options).await?;

        {
            let mut instances = self.instances.write();
            if instances.contains_key(id) {
                handle.shutdown();
                return Err(RegistryError::AlreadyConfigured(id.to_owned()));
            }
            instances.insert(id.to_owned(), Arc::clone(&handle));
        }

        info!(
            "✅ [{id}] Instance ready with {} sensors ({})",
            SENSOR_TYPES.len(),
            handle.coordinator.attribution()
        );
        Ok(handle)
    }

    /// Stop and forget an instance
    pub fn teardown(&self, id: &str) -> RegistryResult<()> {
        let handle = self
            .instances
            .write()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_owned()))?;
        handle.shutdown();
        info!("🗑️ [{id}] Instance removed");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<InstanceHandle>> {
        self.instances.read().get(id).cloned()
    }

    /// Sorted ids of all registered instances
    pub fn instance_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Apply new options by rebuilding the instance.
    ///
    /// The modifier is validated and normalized first. The replacement must pass its
    /// first refresh before it takes over; until then, and on any failure, the
    /// existing instance keeps running unchanged.
    pub async fn update_options(
        &self,
        id: &str,
        options: InstanceOptions,
    ) -> RegistryResult<Arc<InstanceHandle>> {
        let current = self
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_owned()))?;

        let modifier = validate_modifier_option(options.modifier.as_deref(), self.timezone)?;
        let options = InstanceOptions {
            modifier: Some(modifier),
        };

        if options == current.options {
            debug!("[{id}] Options unchanged, keeping instance");
            return Ok(current);
        }

        info!("🔧 [{id}] Reloading with modifier {:?}", options.modifier);
        let replacement = self.build(id, Arc::clone(&current.fetcher), options).await?;

        let previous = self
            .instances
            .write()
            .insert(id.to_owned(), Arc::clone(&replacement));
        if let Some(previous) = previous {
            previous.shutdown();
        }

        Ok(replacement)
    }

    /// Tear down every instance
    pub fn shutdown_all(&self) {
        let handles: Vec<_> = self.instances.write().drain().collect();
        for (id, handle) in handles {
            debug!("🛑 [{id}] Shutting down");
            handle.shutdown();
        }
    }

    async fn build(
        &self,
        id: &str,
        fetcher: Arc<dyn PriceFetcher>,
        options: InstanceOptions,
    ) -> RegistryResult<Arc<InstanceHandle>> {
        let modifier = Modifier::parse(options.modifier.as_deref(), self.timezone)?;
        let coordinator = Arc::new(GasPriceCoordinator::new(
            id,
            Arc::clone(&fetcher),
            modifier,
        ));

        coordinator
            .first_refresh()
            .await
            .map_err(|source| RegistryError::NotReady {
                id: id.to_owned(),
                source,
            })?;

        let sensors: Vec<GasPriceSensor> = SENSOR_TYPES
            .iter()
            .map(|description| GasPriceSensor::new(id, Arc::clone(&coordinator), *description))
            .collect();

        let handle = Arc::new(InstanceHandle {
            id: id.to_owned(),
            coordinator,
            sensors: Arc::new(Mutex::new(sensors)),
            fetcher,
            options,
            tasks: Mutex::new(Vec::new()),
        });

        let states = handle.update_sensors(Utc::now());
        publish_all(self.publisher.as_ref(), &states).await;
        handle.spawn_background(Arc::clone(&self.publisher));

        Ok(handle)
    }
}
