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

mod config;
mod options_watcher;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use fluxion_gas_adapters::{HomeAssistantClient, HomeAssistantPublisher, LogPublisher, ProviderClient};
use fluxion_gas_core::{
    InstanceOptions, InstanceRegistry, PriceFetcher, RegistryError, StatePublisher,
    validate_modifier_option,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::config::{AppConfig, InstanceConfig, OptionsStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// First retry delay after a failed instance setup
const SETUP_RETRY_INITIAL: Duration = Duration::from_secs(60);
const SETUP_RETRY_MAX: Duration = Duration::from_secs(30 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" => {
                println!("FluxION Gas - Dutch gas market prices for Home Assistant");
                println!("Version: {VERSION}");
                println!();
                println!("Usage: fluxion-gas [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help    Print this help message");
                println!("  -v, --version Print version");
                return Ok(());
            }
            "--version" | "-v" => {
                println!("{VERSION}");
                return Ok(());
            }
            _ => {}
        }
    }

    // The log level comes from the config, so loading logs through a provisional subscriber
    let config = tracing::subscriber::with_default(log_subscriber("info"), AppConfig::load)?;
    tracing::subscriber::set_global_default(log_subscriber(&config.system.log_level))
        .context("Failed to install tracing subscriber")?;

    let timezone = config.timezone()?;

    info!("🚀 Starting FluxION Gas v{VERSION}");
    info!("📋 Configuration Summary:");
    info!("   Timezone: {timezone}");
    info!("   Instances: {}", config.instances.len());
    for instance in &config.instances {
        info!(
            "     - {} ({}) modifier={}",
            instance.instance_id(),
            instance.provider,
            instance.modifier.as_deref().unwrap_or("<default>")
        );
    }
    info!("   Options file: {}", config.system.options_path);

    let publisher: Arc<dyn StatePublisher> = match HomeAssistantClient::from_config(
        config.system.ha_base_url.clone(),
        config.system.ha_token.clone(),
    ) {
        Ok(client) => {
            if matches!(client.ping().await, Ok(true)) {
                info!("🏠 Publishing sensor states to Home Assistant at {}", client.base_url());
            } else {
                warn!(
                    "⚠️ Home Assistant at {} is not reachable yet, publishing anyway",
                    client.base_url()
                );
            }
            Arc::new(HomeAssistantPublisher::new(client))
        }
        Err(e) => {
            warn!("⚠️ Home Assistant not configured ({e}), sensor states will only be logged");
            Arc::new(LogPublisher)
        }
    };

    let registry = Arc::new(InstanceRegistry::new(timezone, publisher));
    let store = Arc::new(OptionsStore::new(&config.system.options_path, timezone));
    let stored = store.load_or_default();

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    for instance in &config.instances {
        let id = instance.instance_id().to_owned();
        let options = effective_options(instance, stored.instances.get(&id), timezone);

        let fetcher: Arc<dyn PriceFetcher> = match ProviderClient::with_options(
            instance.provider,
            instance.endpoint.clone(),
            Duration::from_secs(config.system.request_timeout_secs),
        ) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!("❌ [{id}] Failed to create price client: {e}");
                continue;
            }
        };

        tasks.push(tokio::spawn(setup_with_retry(
            Arc::clone(&registry),
            Arc::clone(&store),
            id,
            fetcher,
            options,
        )));
    }

    tasks.push(tokio::spawn(options_watcher::run(
        Arc::clone(&registry),
        Arc::clone(&store),
        Duration::from_secs(config.system.options_poll_interval_secs),
    )));

    shutdown_signal().await;
    info!("🛑 Shutting down");

    for task in &tasks {
        task.abort();
    }
    registry.shutdown_all();

    info!("👋 FluxION Gas stopped");
    Ok(())
}

/// Fmt subscriber filtered by `RUST_LOG`, or by `default_level` when it is unset
fn log_subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .finish()
}

/// Stored options take precedence over the config file; invalid stored options fall
/// back to the configured modifier
fn effective_options(
    instance: &InstanceConfig,
    stored: Option<&InstanceOptions>,
    timezone: Tz,
) -> InstanceOptions {
    let configured = instance.options();
    let id = instance.instance_id();

    let candidate = stored.unwrap_or(&configured);
    match validate_modifier_option(candidate.modifier.as_deref(), timezone) {
        Ok(modifier) => InstanceOptions {
            modifier: Some(modifier),
        },
        Err(e) => {
            warn!("⚠️ [{id}] Stored modifier rejected ({e}), using configured modifier");
            // Config validation already accepted the configured modifier
            let modifier = validate_modifier_option(configured.modifier.as_deref(), timezone)
                .unwrap_or_else(|_| fluxion_gas_core::DEFAULT_TEMPLATE.to_owned());
            InstanceOptions {
                modifier: Some(modifier),
            }
        }
    }
}

/// Set up one instance, retrying with backoff while the first refresh fails
async fn setup_with_retry(
    registry: Arc<InstanceRegistry>,
    store: Arc<OptionsStore>,
    id: String,
    fetcher: Arc<dyn PriceFetcher>,
    options: InstanceOptions,
) {
    let mut delay = SETUP_RETRY_INITIAL;

    loop {
        match registry.setup(&id, Arc::clone(&fetcher), options.clone()).await {
            Ok(handle) => {
                let stored = store.load_or_default();
                if stored.instances.get(&id) != Some(handle.options())
                    && let Err(e) = store.set(&id, handle.options().clone(), "startup")
                {
                    warn!("⚠️ [{id}] Failed to persist options: {e:#}");
                }
                return;
            }
            Err(RegistryError::NotReady { source, .. }) => {
                warn!(
                    "⏳ [{id}] Not ready: {source}. Retrying in {}s",
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(SETUP_RETRY_MAX);
            }
            Err(e) => {
                error!("❌ [{id}] Setup failed: {e}");
                return;
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("❌ Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Amsterdam;
    use fluxion_gas_adapters::Provider;

    fn instance(modifier: Option<&str>) -> InstanceConfig {
        InstanceConfig {
            modifier: modifier.map(str::to_owned),
            ..InstanceConfig::new(Provider::EnergyZero)
        }
    }

    #[derive(Debug, Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_config_warnings_reach_scoped_subscriber() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let config = AppConfig::default();
        tracing::subscriber::with_default(subscriber, || config.validate()).unwrap();

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("system.ha_token"));
    }

    fn options(modifier: &str) -> InstanceOptions {
        InstanceOptions {
            modifier: Some(modifier.to_owned()),
        }
    }

    #[test]
    fn test_effective_options_prefers_stored() {
        let instance = instance(Some("current_price * 2"));
        let stored = options("current_price * 3");

        let effective = effective_options(&instance, Some(&stored), Amsterdam);
        assert_eq!(effective, stored);
    }

    #[test]
    fn test_effective_options_normalizes_config() {
        let effective = effective_options(&instance(None), None, Amsterdam);
        assert_eq!(effective, options("current_price"));
    }

    #[test]
    fn test_effective_options_falls_back_on_invalid_stored() {
        let instance = instance(Some("current_price * 2"));
        let stored = options("{{ current_price * }}");

        let effective = effective_options(&instance, Some(&stored), Amsterdam);
        assert_eq!(effective, options("current_price * 2"));
    }
}
