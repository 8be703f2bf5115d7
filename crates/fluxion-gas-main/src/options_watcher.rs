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

//! Applies edits of the options file to running instances

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fluxion_gas_core::{InstanceOptions, InstanceRegistry, RegistryError};
use tracing::{debug, error, info, warn};

use crate::config::OptionsStore;

/// Entries of `incoming` that belong to a known instance and differ from its options.
///
/// Ids missing from `known` are not running and are skipped.
pub fn changed_instances(
    known: &BTreeMap<String, InstanceOptions>,
    incoming: &BTreeMap<String, InstanceOptions>,
) -> Vec<(String, InstanceOptions)> {
    incoming
        .iter()
        .filter(|(id, options)| known.get(*id).is_some_and(|current| current != *options))
        .map(|(id, options)| (id.clone(), options.clone()))
        .collect()
}

fn running_options(registry: &InstanceRegistry) -> BTreeMap<String, InstanceOptions> {
    registry
        .instance_ids()
        .into_iter()
        .filter_map(|id| {
            let options = registry.get(&id)?.options().clone();
            Some((id, options))
        })
        .collect()
}

/// Poll the options file and reload instances whose options changed
pub async fn run(registry: Arc<InstanceRegistry>, store: Arc<OptionsStore>, poll_interval: Duration) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately; startup already applied the file
    interval.tick().await;

    info!(
        "👀 Watching {} for option changes every {}s",
        store.path().display(),
        poll_interval.as_secs()
    );

    // Options the registry refused as invalid; not retried until edited again
    let mut rejected: BTreeMap<String, InstanceOptions> = BTreeMap::new();

    loop {
        interval.tick().await;

        if !store.exists() {
            continue;
        }
        let persisted = match store.load() {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!("⚠️ Failed to read options: {e:#}");
                continue;
            }
        };

        let known = running_options(&registry);
        for (id, options) in changed_instances(&known, &persisted.instances) {
            if rejected.get(&id) == Some(&options) {
                continue;
            }

            debug!("🔧 [{id}] Options changed: {:?}", options.modifier);
            match registry.update_options(&id, options.clone()).await {
                Ok(handle) => {
                    rejected.remove(&id);
                    if handle.options() != &options
                        && let Err(e) = store.set(&id, handle.options().clone(), "options_watcher")
                    {
                        warn!("⚠️ [{id}] Failed to store normalized options: {e:#}");
                    }
                }
                Err(RegistryError::InvalidTemplate(e)) => {
                    error!("❌ [{id}] Rejected modifier {:?}: {e}", options.modifier);
                    rejected.insert(id, options);
                }
                Err(e) => {
                    warn!("⚠️ [{id}] Options not applied, will retry: {e}");
                }
            }
        }
    }
}
