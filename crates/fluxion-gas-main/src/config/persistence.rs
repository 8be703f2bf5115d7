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

//! Persisted per-instance options
//!
//! The options file is the editable side of an instance: a user (or the add-on UI)
//! edits the modifier there and the running service picks the change up.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use fluxion_gas_core::{InstanceOptions, validate_modifier_option};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const OPTIONS_VERSION: &str = "1.0.0";

/// Metadata for tracking option changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionsMetadata {
    pub last_modified: DateTime<Utc>,
    /// Source of modification (startup, options_watcher, ...)
    pub modified_by: String,
    pub version: String,
}

impl Default for OptionsMetadata {
    fn default() -> Self {
        Self {
            last_modified: Utc::now(),
            modified_by: "startup".to_owned(),
            version: OPTIONS_VERSION.to_owned(),
        }
    }
}

/// Options of every instance plus metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedOptions {
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceOptions>,
    #[serde(default)]
    pub metadata: OptionsMetadata,
}

/// JSON file holding [`PersistedOptions`]
#[derive(Debug)]
pub struct OptionsStore {
    path: PathBuf,
    timezone: Tz,
    write_lock: Mutex<()>,
}

impl OptionsStore {
    pub fn new(path: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            path: path.into(),
            timezone,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load options from disk
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(&self) -> Result<PersistedOptions> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read options from {}", self.path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse options JSON {}", self.path.display()))
    }

    /// Load options, treating a missing or broken file as empty
    pub fn load_or_default(&self) -> PersistedOptions {
        if !self.exists() {
            return PersistedOptions::default();
        }
        self.load().unwrap_or_else(|e| {
            warn!("⚠️ Ignoring options file: {e:#}");
            PersistedOptions::default()
        })
    }

    /// Store the normalized options of one instance.
    ///
    /// Only `options` is validated; entries of other instances are written back as they
    /// were read, so a broken hand edit elsewhere does not block this write.
    ///
    /// # Errors
    /// Returns error if the modifier is invalid, the existing file cannot be parsed or
    /// the file cannot be written
    pub fn set(&self, id: &str, options: InstanceOptions, modified_by: &str) -> Result<()> {
        let modifier = validate_modifier_option(options.modifier.as_deref(), self.timezone)
            .with_context(|| format!("Invalid modifier for instance '{id}'"))?;

        let _guard = self.write_lock.lock();
        let mut instances = if self.exists() {
            self.load()?.instances
        } else {
            BTreeMap::new()
        };
        instances.insert(
            id.to_owned(),
            InstanceOptions {
                modifier: Some(modifier),
            },
        );
        self.write(instances, modified_by)
    }

    fn write(&self, instances: BTreeMap<String, InstanceOptions>, modified_by: &str) -> Result<()> {
        let persisted = PersistedOptions {
            instances,
            metadata: OptionsMetadata {
                last_modified: Utc::now(),
                modified_by: modified_by.to_owned(),
                version: OPTIONS_VERSION.to_owned(),
            },
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create options directory {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(&persisted)?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json)
            .with_context(|| format!("Failed to write options to {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        info!(
            "💾 Saved options to {} (modified by: {modified_by})",
            self.path.display()
        );
        Ok(())
    }
}
