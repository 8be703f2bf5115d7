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

mod persistence;
mod validation;

pub use persistence::OptionsStore;
pub use validation::ValidationResult;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use fluxion_gas_adapters::Provider;
use fluxion_gas_core::{InstanceOptions, validate_modifier_option};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Home Assistant add-on options
const HA_OPTIONS_PATH: &str = "/data/options.json";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configured price sources, one coordinator and sensor set each
    #[serde(default = "default_instances")]
    pub instances: Vec<InstanceConfig>,

    #[serde(default)]
    pub system: SystemConfig,
}

/// One integration instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Instance id; empty means the provider's default id
    #[serde(default)]
    pub id: String,

    pub provider: Provider,

    /// Initial price modifier template.
    /// Accepts both "modifier" and the "modifyer" spelling of older add-on options.
    #[serde(default, alias = "modifyer")]
    pub modifier: Option<String>,

    /// Endpoint override (proxies, testing)
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl InstanceConfig {
    pub fn new(provider: Provider) -> Self {
        Self {
            id: provider.default_instance_id().to_owned(),
            provider,
            modifier: None,
            endpoint: None,
        }
    }

    pub fn instance_id(&self) -> &str {
        let id = self.id.trim();
        if id.is_empty() {
            self.provider.default_instance_id()
        } else {
            id
        }
    }

    pub fn options(&self) -> InstanceOptions {
        InstanceOptions {
            modifier: self.modifier.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Local timezone that defines "today" and the template's `now()`
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Home Assistant base URL (optional, falls back to HA_BASE_URL)
    #[serde(default)]
    pub ha_base_url: Option<String>,

    /// Home Assistant token (optional, falls back to HA_TOKEN or SUPERVISOR_TOKEN)
    #[serde(default)]
    pub ha_token: Option<String>,

    /// HTTP timeout for price provider requests
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Where per-instance options are persisted
    #[serde(default = "default_options_path")]
    pub options_path: String,

    /// How often the options file is checked for edits
    #[serde(default = "default_options_poll_interval_secs")]
    pub options_poll_interval_secs: u64,
}

fn default_instances() -> Vec<InstanceConfig> {
    Provider::ALL.into_iter().map(InstanceConfig::new).collect()
}

fn default_timezone() -> String {
    "Europe/Amsterdam".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_options_path() -> String {
    "/data/fluxion-gas/options.json".to_owned()
}

fn default_options_poll_interval_secs() -> u64 {
    30
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            log_level: default_log_level(),
            ha_base_url: None,
            ha_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            options_path: default_options_path(),
            options_poll_interval_secs: default_options_poll_interval_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instances: default_instances(),
            system: SystemConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from HA add-on options or a config file.
    ///
    /// Lookup order: `/data/options.json`, `config.toml`, `config.json`, then defaults.
    /// Environment overrides are applied on top of whichever source was found.
    pub fn load() -> Result<Self> {
        let sources = [
            Path::new(HA_OPTIONS_PATH),
            Path::new("config.toml"),
            Path::new("config.json"),
        ];

        let mut config = if let Some(config) = Self::load_first_of(&sources)? {
            config
        } else {
            warn!("No configuration file found, using defaults with environment overrides");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse the first readable file of `paths`; `None` when none exists
    pub fn load_first_of(paths: &[&Path]) -> Result<Option<Self>> {
        for path in paths {
            let Ok(contents) = fs::read_to_string(path) else {
                continue;
            };
            let config = Self::parse(path, &contents)?;
            info!("✅ Loaded configuration from {}", path.display());
            return Ok(Some(config));
        }
        Ok(None)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self> {
        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(contents).with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            serde_json::from_str(contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override connection and timezone settings from `lookup` (the process environment
    /// in production)
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("HA_BASE_URL") {
            self.system.ha_base_url = Some(url);
        }
        if let Some(token) = lookup("HA_TOKEN") {
            self.system.ha_token = Some(token);
        }
        if let Some(timezone) = lookup("FLUXION_GAS_TIMEZONE") {
            self.system.timezone = timezone;
        }
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.system
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {e}", self.system.timezone))
    }

    /// Validate configuration with detailed error reporting
    pub fn validate_detailed(&self) -> ValidationResult {
        let mut result = ValidationResult::success();

        let timezone = match self.timezone() {
            Ok(tz) => Some(tz),
            Err(e) => {
                result.add_error("system.timezone", e.to_string());
                None
            }
        };

        if self.instances.is_empty() {
            result.add_error(
                "instances",
                "Configuration must include at least one instance",
            );
        }

        let mut seen = HashSet::new();
        for (idx, instance) in self.instances.iter().enumerate() {
            let prefix = format!("instances[{idx}]");
            let id = instance.instance_id();

            if !id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            {
                result.add_error(
                    format!("{prefix}.id"),
                    format!("Instance id '{id}' may only contain a-z, 0-9 and '_'"),
                );
            }
            if !seen.insert(id) {
                result.add_error(
                    format!("{prefix}.id"),
                    format!("Duplicate instance id '{id}'"),
                );
            }

            if let Some(endpoint) = &instance.endpoint
                && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
            {
                result.add_error(
                    format!("{prefix}.endpoint"),
                    format!("Endpoint '{endpoint}' must be an http(s) URL"),
                );
            }

            if let Some(tz) = timezone
                && let Err(e) = validate_modifier_option(instance.modifier.as_deref(), tz)
            {
                result.add_error(format!("{prefix}.modifier"), e.to_string());
            }
        }

        if self.system.request_timeout_secs == 0 {
            result.add_error(
                "system.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }
        if self.system.options_poll_interval_secs == 0 {
            result.add_error(
                "system.options_poll_interval_secs",
                "Options poll interval must be greater than 0",
            );
        }
        if self.system.options_path.trim().is_empty() {
            result.add_error("system.options_path", "Options path cannot be empty");
        }

        if let Some(url) = &self.system.ha_base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            result.add_error(
                "system.ha_base_url",
                format!("Home Assistant URL '{url}' must be an http(s) URL"),
            );
        }
        if self.system.ha_token.is_none() {
            result.add_warning(
                "system.ha_token",
                "No Home Assistant token configured; HA_TOKEN or SUPERVISOR_TOKEN will be used if set, otherwise sensor states are only logged",
            );
        }
        if !LOG_LEVELS.contains(&self.system.log_level.to_ascii_lowercase().as_str()) {
            result.add_warning(
                "system.log_level",
                format!(
                    "Unknown log level '{}', expected one of {}",
                    self.system.log_level,
                    LOG_LEVELS.join(", ")
                ),
            );
        }

        result
    }

    /// Validate configuration, failing on the first error
    pub fn validate(&self) -> Result<()> {
        let result = self.validate_detailed();
        for warning in &result.warnings {
            warn!("⚠️ Config: {warning}");
        }
        if result.has_errors() {
            let errors: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
            anyhow::bail!("Invalid configuration: {}", errors.join("; "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.instances.len(), 2);
        assert_eq!(config.instances[0].instance_id(), "energyzero");
        assert_eq!(config.instances[1].instance_id(), "easyenergy");
        assert_eq!(config.system.timezone, "Europe/Amsterdam");
        assert_eq!(config.system.request_timeout_secs, 30);

        assert!(config.validate().is_ok());
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Amsterdam);
    }

    #[test]
    fn test_parse_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [[instances]]
            provider = "energy_zero"
            modifier = "{{ current_price * 1.21 }}"

            [[instances]]
            id = "easy_backup"
            provider = "easy_energy"
            endpoint = "http://localhost:8080/tariffs"

            [system]
            timezone = "Europe/Brussels"
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.instances.len(), 2);
        assert_eq!(config.instances[0].instance_id(), "energyzero");
        assert_eq!(
            config.instances[0].modifier.as_deref(),
            Some("{{ current_price * 1.21 }}")
        );
        assert_eq!(config.instances[1].instance_id(), "easy_backup");
        assert_eq!(config.system.timezone, "Europe/Brussels");
        assert_eq!(config.system.options_poll_interval_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_ha_addon_options() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "instances": [
                    {"provider": "easyenergy", "modifyer": "current_price + 0.05"}
                ],
                "system": {"ha_token": "abc"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.instances[0].provider, Provider::EasyEnergy);
        assert_eq!(
            config.instances[0].options().modifier.as_deref(),
            Some("current_price + 0.05")
        );
        let result = config.validate_detailed();
        assert!(result.valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_missing_instances_use_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"system": {}}"#).unwrap();
        assert_eq!(config.instances.len(), 2);
    }

    #[test]
    fn test_validate_empty_instances() {
        let mut config = AppConfig::default();
        config.instances.clear();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least one instance"));
    }

    #[test]
    fn test_validate_duplicate_ids() {
        let mut config = AppConfig::default();
        config.instances[1] = InstanceConfig::new(Provider::EnergyZero);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate instance id 'energyzero'"));
    }

    #[test]
    fn test_validate_invalid_id() {
        let mut config = AppConfig::default();
        config.instances[0].id = "Energy Zero".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_modifier() {
        let mut config = AppConfig::default();

        config.instances[0].modifier = Some("{{ 1.21 }}".to_owned());
        let result = config.validate_detailed();
        assert!(result.has_errors());
        assert_eq!(result.errors[0].field, "instances[0].modifier");

        config.instances[0].modifier = Some("{{ current_price * }}".to_owned());
        assert!(config.validate().is_err());

        config.instances[0].modifier = Some("{{ current_price | round(3) }}".to_owned());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timezone_and_limits() {
        let mut config = AppConfig::default();
        config.system.timezone = "Mars/Olympus_Mons".to_owned();
        assert!(config.validate().unwrap_err().to_string().contains("timezone"));

        let mut config = AppConfig::default();
        config.system.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.instances[0].endpoint = Some("ftp://example.com".to_owned());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_detailed_warnings() {
        let mut config = AppConfig::default();
        config.system.log_level = "loud".to_owned();

        let result = config.validate_detailed();
        assert!(result.valid);
        let fields: Vec<&str> = result.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["system.ha_token", "system.log_level"]);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HA_BASE_URL", "http://ha.local:8123"),
            ("FLUXION_GAS_TIMEZONE", "UTC"),
        ]);

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_owned()));

        assert_eq!(
            config.system.ha_base_url.as_deref(),
            Some("http://ha.local:8123")
        );
        assert_eq!(config.system.ha_token, None);
        assert_eq!(config.timezone().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn test_load_first_of() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("options.json");
        let toml_path = dir.path().join("config.toml");
        fs::write(
            &toml_path,
            "[[instances]]\nprovider = \"easy_energy\"\n",
        )
        .unwrap();

        let config = AppConfig::load_first_of(&[missing.as_path(), toml_path.as_path()])
            .unwrap()
            .unwrap();
        assert_eq!(config.instances.len(), 1);
        assert_eq!(config.instances[0].instance_id(), "easyenergy");

        assert!(AppConfig::load_first_of(&[missing.as_path()]).unwrap().is_none());
    }

    #[test]
    fn test_load_first_of_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("config.json");
        fs::write(&json_path, "{ not json").unwrap();

        let err = AppConfig::load_first_of(&[json_path.as_path()]).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
