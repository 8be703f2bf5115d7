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

//! Price modifier templates
//!
//! A modifier turns a raw provider price into the price the user actually pays.
//! Three source forms are accepted:
//!
//! - a bare expression: `current_price * 1.21 + 0.3`
//! - a single block: `{{ current_price * 1.21 + 0.3 }}` (the value keeps its type)
//! - text mixed with blocks, rendered to a string and then read as a number
//!
//! `now()` evaluates to the hour being processed, in the configured timezone, so
//! time-of-day tariffs line up with the price they apply to.

mod eval;
mod lexer;
mod parser;

pub use eval::Value;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt::Write as _;
use tracing::trace;

use crate::errors::{TemplateError, TemplateResult};
use eval::{EvalContext, evaluate};
use parser::{Expr, parse_expression};

/// Template used when none is configured
pub const DEFAULT_TEMPLATE: &str = "current_price";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Expr(Expr),
}

/// A parsed, ready-to-evaluate price modifier
#[derive(Debug, Clone)]
pub struct Modifier {
    source: String,
    segments: Vec<Segment>,
    timezone: Tz,
}

impl Modifier {
    /// Parse `source`; `None` or a blank string selects [`DEFAULT_TEMPLATE`]
    pub fn parse(source: Option<&str>, timezone: Tz) -> TemplateResult<Self> {
        let source = match source.map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => DEFAULT_TEMPLATE,
        };

        Ok(Self {
            source: source.to_owned(),
            segments: parse_segments(source)?,
            timezone,
        })
    }

    /// Modifier that passes prices through unchanged (besides rounding)
    pub fn identity(timezone: Tz) -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_owned(),
            segments: vec![Segment::Expr(Expr::Variable("current_price".to_owned()))],
            timezone,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Evaluate for one price point; `at` becomes the value of `now()`
    pub fn evaluate(&self, raw_price: f64, at: DateTime<Utc>) -> TemplateResult<f64> {
        let value = self.render(raw_price, at)?;
        let price = coerce_to_number(&value)?;
        trace!(
            "🧮 Modifier '{}' at {}: {} -> {}",
            self.source, at, raw_price, price
        );
        Ok(round_price(price))
    }

    /// Evaluate without the numeric coercion
    pub fn render(&self, raw_price: f64, at: DateTime<Utc>) -> TemplateResult<Value> {
        let ctx = EvalContext {
            current_price: raw_price,
            now: at.with_timezone(&self.timezone),
        };

        if let Some(expr) = self.single_expression() {
            return evaluate(expr, &ctx);
        }

        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Expr(expr) => {
                    let _ = write!(rendered, "{}", evaluate(expr, &ctx)?);
                }
            }
        }
        Ok(Value::Str(rendered.trim().to_owned()))
    }

    /// True when the template reads `current_price` anywhere
    pub fn references_current_price(&self) -> bool {
        self.segments.iter().any(|segment| match segment {
            Segment::Expr(expr) => expr.references("current_price"),
            Segment::Text(_) => false,
        })
    }

    /// The only expression block, when everything around it is whitespace
    fn single_expression(&self) -> Option<&Expr> {
        let mut found = None;
        for segment in &self.segments {
            match segment {
                Segment::Text(text) if text.trim().is_empty() => {}
                Segment::Text(_) => return None,
                Segment::Expr(expr) => {
                    if found.is_some() {
                        return None;
                    }
                    found = Some(expr);
                }
            }
        }
        found
    }
}

fn parse_segments(source: &str) -> TemplateResult<Vec<Segment>> {
    if !source.contains(OPEN) {
        return Ok(vec![Segment::Expr(parse_expression(source)?)]);
    }

    let mut segments = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(open) = rest.find(OPEN) {
        if open > 0 {
            segments.push(Segment::Text(rest[..open].to_owned()));
        }

        let inner_start = open + OPEN.len();
        let Some(close) = rest[inner_start..].find(CLOSE) else {
            return Err(TemplateError::syntax(
                offset + open,
                "unclosed '{{' expression block",
            ));
        };

        let inner = &rest[inner_start..inner_start + close];
        let expr = parse_expression(inner).map_err(|e| e.offset_by(offset + inner_start))?;
        segments.push(Segment::Expr(expr));

        let consumed = inner_start + close + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_owned()));
    }
    Ok(segments)
}

fn coerce_to_number(value: &Value) -> TemplateResult<f64> {
    let number = match value {
        Value::Number(n) => Some(*n),
        Value::Str(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(_) | Value::Time(_) | Value::None => None,
    };

    match number {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(TemplateError::NotNumeric(value.to_string())),
    }
}

/// Round a price to 5 decimal places, ties to even
pub fn round_price(price: f64) -> f64 {
    (price * 100_000.0).round_ties_even() / 100_000.0
}

/// Remove runs of two or more whitespace characters
///
/// Pasted templates often carry line breaks and indentation; single spaces are kept.
pub fn normalize_template(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut run = String::new();

    for c in raw.chars() {
        if c.is_whitespace() {
            run.push(c);
            continue;
        }
        if run.chars().count() == 1 {
            out.push_str(&run);
        }
        run.clear();
        out.push(c);
    }
    if run.chars().count() == 1 {
        out.push_str(&run);
    }
    out
}

/// Check that a template parses and evaluates with `current_price = 0`
///
/// Any result type is accepted here; a non-numeric result only fails at refresh time.
pub fn validate_template(source: &str, timezone: Tz) -> TemplateResult<()> {
    let modifier = Modifier::parse(Some(source), timezone)?;
    modifier.render(0.0, Utc::now())?;
    Ok(())
}

/// Normalize and validate a user-entered modifier option
///
/// Returns the template to store: normalized, or [`DEFAULT_TEMPLATE`] when blank.
pub fn validate_modifier_option(raw: Option<&str>, timezone: Tz) -> TemplateResult<String> {
    let normalized = raw.map(normalize_template).unwrap_or_default();
    let template = if normalized.trim().is_empty() {
        DEFAULT_TEMPLATE.to_owned()
    } else {
        normalized.trim().to_owned()
    };

    if !template.contains("current_price") {
        return Err(TemplateError::MissingCurrentPrice);
    }
    validate_template(&template, timezone)?;
    Ok(template)
}
