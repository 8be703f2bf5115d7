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

//! Error types shared by the coordinator, the modifier engine and the sensors

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure while retrieving prices from a provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("request timed out")]
    Timeout,

    #[error("provider returned error status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Failure while parsing or evaluating a modifier template
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown filter '{0}'")]
    UnknownFilter(String),

    #[error("{target} has no attribute '{name}'")]
    UnknownAttribute { target: String, name: String },

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("template result '{0}' is not a number")]
    NotNumeric(String),

    #[error("template must reference current_price")]
    MissingCurrentPrice,
}

impl TemplateError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Shift the reported position of a syntax error by `offset` bytes
    pub(crate) fn offset_by(self, offset: usize) -> Self {
        match self {
            Self::Syntax { position, message } => Self::Syntax {
                position: position + offset,
                message,
            },
            other => other,
        }
    }
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// A coordinator refresh cycle failed; nothing was committed
#[derive(Debug, Clone, Error)]
pub enum UpdateFailed {
    #[error("Fetching energy price data failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Applying price modifier for {timestamp} failed: {source}")]
    Template {
        timestamp: DateTime<Utc>,
        #[source]
        source: TemplateError,
    },
}

/// A sensor could not extract its statistic; the sensor shows no value
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("statistic '{0}' has no value")]
    Missing(&'static str),

    #[error("no processed dataset available")]
    NoData,
}

/// Instance lifecycle errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("instance '{0}' is already configured")]
    AlreadyConfigured(String),

    #[error("instance '{0}' is not configured")]
    NotFound(String),

    #[error("invalid modifier template: {0}")]
    InvalidTemplate(#[from] TemplateError),

    #[error("instance '{id}' is not ready: {source}")]
    NotReady {
        id: String,
        #[source]
        source: UpdateFailed,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;
