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

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Datelike, Timelike};
use chrono_tz::Tz;
use fluxion_gas_types::PRICE_TIME_FORMAT;

use super::parser::{BinaryOp, CompareOp, Expr, UnaryOp};
use crate::errors::{TemplateError, TemplateResult};

/// Runtime value of a modifier expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
    Time(DateTime<Tz>),
    None,
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
            Self::Time(_) => "datetime",
            Self::None => "none",
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0,
            Self::Bool(b) => *b,
            Self::Str(s) => !s.is_empty(),
            Self::Time(_) => true,
            Self::None => false,
        }
    }

    /// Numeric view for arithmetic; bools count as 0/1
    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    fn expect_number(&self, context: &str) -> TemplateResult<f64> {
        self.as_number().ok_or_else(|| {
            TemplateError::Type(format!(
                "{context} expects a number, got {}",
                self.type_name()
            ))
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Str(s) => f.write_str(s),
            Self::Time(t) => write!(f, "{}", t.format(PRICE_TIME_FORMAT)),
            Self::None => f.write_str("None"),
        }
    }
}

/// Bindings visible to one evaluation
#[derive(Debug, Clone, Copy)]
pub(crate) struct EvalContext {
    pub current_price: f64,
    pub now: DateTime<Tz>,
}

pub(crate) fn evaluate(expr: &Expr, ctx: &EvalContext) -> TemplateResult<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::None => Ok(Value::None),
        Expr::Variable(name) => match name.as_str() {
            "current_price" => Ok(Value::Number(ctx.current_price)),
            _ => Err(TemplateError::UnknownVariable(name.clone())),
        },
        Expr::Call { name, args } => {
            let args = evaluate_all(args, ctx)?;
            call_function(name, &args, ctx)
        }
        Expr::Attribute { target, name } => {
            let target = evaluate(target, ctx)?;
            attribute(&target, name)
        }
        Expr::MethodCall { target, name, args } => {
            let target = evaluate(target, ctx)?;
            let args = evaluate_all(args, ctx)?;
            call_method(&target, name, &args)
        }
        Expr::Filter { target, name, args } => {
            let mut values = vec![evaluate(target, ctx)?];
            values.extend(evaluate_all(args, ctx)?);
            apply_filter(name, &values)
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, ctx)?.expect_number("unary operator")?;
            Ok(Value::Number(match op {
                UnaryOp::Neg => -value,
                UnaryOp::Pos => value,
            }))
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, ctx)?;
            let rhs = evaluate(rhs, ctx)?;
            binary(*op, &lhs, &rhs)
        }
        Expr::Compare { first, rest } => {
            let mut lhs = evaluate(first, ctx)?;
            for (op, rhs_expr) in rest {
                let rhs = evaluate(rhs_expr, ctx)?;
                if !compare(*op, &lhs, &rhs)? {
                    return Ok(Value::Bool(false));
                }
                lhs = rhs;
            }
            Ok(Value::Bool(true))
        }
        Expr::And(lhs, rhs) => {
            let lhs = evaluate(lhs, ctx)?;
            if lhs.is_truthy() {
                evaluate(rhs, ctx)
            } else {
                Ok(lhs)
            }
        }
        Expr::Or(lhs, rhs) => {
            let lhs = evaluate(lhs, ctx)?;
            if lhs.is_truthy() {
                Ok(lhs)
            } else {
                evaluate(rhs, ctx)
            }
        }
        Expr::Not(operand) => Ok(Value::Bool(!evaluate(operand, ctx)?.is_truthy())),
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            if evaluate(condition, ctx)?.is_truthy() {
                evaluate(then_branch, ctx)
            } else {
                evaluate(else_branch, ctx)
            }
        }
    }
}

fn evaluate_all(exprs: &[Expr], ctx: &EvalContext) -> TemplateResult<Vec<Value>> {
    exprs.iter().map(|e| evaluate(e, ctx)).collect()
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> TemplateResult<Value> {
    if op == BinaryOp::Add
        && let (Value::Str(a), Value::Str(b)) = (lhs, rhs)
    {
        return Ok(Value::Str(format!("{a}{b}")));
    }

    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
    };
    let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) else {
        return Err(TemplateError::Type(format!(
            "unsupported operand types for {symbol}: {} and {}",
            lhs.type_name(),
            rhs.type_name()
        )));
    };

    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(TemplateError::DivisionByZero);
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(TemplateError::DivisionByZero);
            }
            (a / b).floor()
        }
        // Result takes the sign of the divisor
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(TemplateError::DivisionByZero);
            }
            a - b * (a / b).floor()
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(TemplateError::DivisionByZero);
            }
            a.powf(b)
        }
    };
    Ok(Value::Number(result))
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> TemplateResult<bool> {
    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::None, Value::None) => Some(Ordering::Equal),
        _ => match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };

    match (op, ordering) {
        (CompareOp::Eq, ord) => Ok(ord == Some(Ordering::Equal)),
        (CompareOp::NotEq, ord) => Ok(ord != Some(Ordering::Equal)),
        (_, None) => Err(TemplateError::Type(format!(
            "cannot order {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
        (CompareOp::Lt, Some(ord)) => Ok(ord == Ordering::Less),
        (CompareOp::LtEq, Some(ord)) => Ok(ord != Ordering::Greater),
        (CompareOp::Gt, Some(ord)) => Ok(ord == Ordering::Greater),
        (CompareOp::GtEq, Some(ord)) => Ok(ord != Ordering::Less),
    }
}

fn call_function(name: &str, args: &[Value], ctx: &EvalContext) -> TemplateResult<Value> {
    match name {
        "now" => {
            expect_arity(name, args, 0, 0)?;
            Ok(Value::Time(ctx.now))
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(TemplateError::Type(format!(
                    "{name}() expects at least one argument"
                )));
            }
            let mut best = args[0].expect_number(name)?;
            for arg in &args[1..] {
                let value = arg.expect_number(name)?;
                let better = if name == "min" {
                    value < best
                } else {
                    value > best
                };
                if better {
                    best = value;
                }
            }
            Ok(Value::Number(best))
        }
        "abs" | "round" | "float" | "int" => apply_filter(name, args),
        _ => Err(TemplateError::UnknownFunction(name.to_owned())),
    }
}

/// Filters receive the piped value as their first argument
fn apply_filter(name: &str, args: &[Value]) -> TemplateResult<Value> {
    match name {
        "abs" => {
            expect_arity(name, args, 1, 1)?;
            Ok(Value::Number(args[0].expect_number(name)?.abs()))
        }
        "round" => {
            expect_arity(name, args, 1, 2)?;
            let value = args[0].expect_number(name)?;
            let digits = match args.get(1) {
                Some(arg) => arg.expect_number(name)?,
                None => 0.0,
            };
            Ok(Value::Number(round_to(value, digits)))
        }
        "float" => {
            expect_arity(name, args, 1, 1)?;
            Ok(Value::Number(to_float(&args[0])?))
        }
        "int" => {
            expect_arity(name, args, 1, 1)?;
            Ok(Value::Number(to_float(&args[0])?.trunc()))
        }
        _ => Err(TemplateError::UnknownFilter(name.to_owned())),
    }
}

fn attribute(target: &Value, name: &str) -> TemplateResult<Value> {
    let Value::Time(time) = target else {
        return Err(TemplateError::UnknownAttribute {
            target: target.type_name().to_owned(),
            name: name.to_owned(),
        });
    };

    let value = match name {
        "year" => f64::from(time.year()),
        "month" => f64::from(time.month()),
        "day" => f64::from(time.day()),
        "hour" => f64::from(time.hour()),
        "minute" => f64::from(time.minute()),
        "second" => f64::from(time.second()),
        _ => {
            return Err(TemplateError::UnknownAttribute {
                target: target.type_name().to_owned(),
                name: name.to_owned(),
            });
        }
    };
    Ok(Value::Number(value))
}

fn call_method(target: &Value, name: &str, args: &[Value]) -> TemplateResult<Value> {
    if let Value::Time(time) = target {
        let weekday = time.weekday();
        match name {
            "weekday" => {
                expect_arity(name, args, 0, 0)?;
                return Ok(Value::Number(f64::from(weekday.num_days_from_monday())));
            }
            "isoweekday" => {
                expect_arity(name, args, 0, 0)?;
                return Ok(Value::Number(f64::from(weekday.number_from_monday())));
            }
            _ => {}
        }
    }

    Err(TemplateError::UnknownAttribute {
        target: target.type_name().to_owned(),
        name: name.to_owned(),
    })
}

fn expect_arity(name: &str, args: &[Value], min: usize, max: usize) -> TemplateResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(TemplateError::Type(format!(
            "{name}() takes {expected} arguments ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn to_float(value: &Value) -> TemplateResult<f64> {
    match value {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| TemplateError::Type(format!("cannot convert '{s}' to a number"))),
        other => other.expect_number("conversion"),
    }
}

/// Round half to even, like Jinja's `round`
fn round_to(value: f64, digits: f64) -> f64 {
    let factor = 10f64.powf(digits.trunc());
    (value * factor).round_ties_even() / factor
}
