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

pub mod coordinator;
pub mod errors;
pub mod modifier;
pub mod registry;
pub mod scheduling;
pub mod sensor;
pub mod statistics;
pub mod traits;

pub use coordinator::{CoordinatorState, DEFAULT_UPDATE_INTERVAL, GasPriceCoordinator, RefreshStatus};
pub use errors::{
    FetchError, FetchResult, ProjectionError, RegistryError, RegistryResult, TemplateError,
    TemplateResult, UpdateFailed,
};
pub use modifier::{
    DEFAULT_TEMPLATE, Modifier, Value, normalize_template, round_price, validate_modifier_option,
    validate_template,
};
pub use registry::{InstanceHandle, InstanceOptions, InstanceRegistry};
pub use scheduling::*;
pub use sensor::{GasPriceSensor, ICON, SENSOR_TYPES, SensorDescription, SensorState, UNIT_OF_MEASUREMENT};
pub use statistics::derive_statistics;
pub use traits::{PriceFetcher, StatePublisher};
