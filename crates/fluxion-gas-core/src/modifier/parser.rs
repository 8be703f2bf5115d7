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

//! Recursive-descent parser for modifier expressions.
//!
//! Precedence, lowest first:
//! `a if c else b` → `or` → `and` → `not` → comparisons → `+ -` → `* / // %`
//! → `**` → unary `- +` → postfix (`.attr`, `.method()`, `| filter`)

use super::lexer::{Token, TokenKind, tokenize};
use crate::errors::{TemplateError, TemplateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Bool(bool),
    Str(String),
    None,
    Variable(String),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Attribute {
        target: Box<Expr>,
        name: String,
    },
    MethodCall {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Filter {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Chained comparison: `a < b <= c` means `a < b and b <= c`
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

impl Expr {
    /// True when the expression reads the `current_price` variable anywhere
    pub(crate) fn references(&self, variable: &str) -> bool {
        match self {
            Self::Variable(name) => name == variable,
            Self::Number(_) | Self::Bool(_) | Self::Str(_) | Self::None => false,
            Self::Call { args, .. } => args.iter().any(|a| a.references(variable)),
            Self::Attribute { target, .. } => target.references(variable),
            Self::MethodCall { target, args, .. } | Self::Filter { target, args, .. } => {
                target.references(variable) || args.iter().any(|a| a.references(variable))
            }
            Self::Unary { operand, .. } | Self::Not(operand) => operand.references(variable),
            Self::Binary { lhs, rhs, .. } | Self::And(lhs, rhs) | Self::Or(lhs, rhs) => {
                lhs.references(variable) || rhs.references(variable)
            }
            Self::Compare { first, rest } => {
                first.references(variable) || rest.iter().any(|(_, e)| e.references(variable))
            }
            Self::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.references(variable)
                    || then_branch.references(variable)
                    || else_branch.references(variable)
            }
        }
    }
}

/// Parse a complete expression; trailing tokens are a syntax error
pub(crate) fn parse_expression(src: &str) -> TemplateResult<Expr> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, cursor: 0 };

    if parser.peek() == &TokenKind::Eof {
        return Err(TemplateError::syntax(0, "empty expression"));
    }

    let expr = parser.expression()?;
    match parser.peek() {
        TokenKind::Eof => Ok(expr),
        other => Err(TemplateError::syntax(
            parser.pos(),
            format!("unexpected {}", describe(other)),
        )),
    }
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        // tokenize always terminates the list with Eof
        &self.tokens[self.cursor.min(self.tokens.len() - 1)].kind
    }

    fn pos(&self) -> usize {
        self.tokens[self.cursor.min(self.tokens.len() - 1)].pos
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), TokenKind::Ident(name) if name == keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> TemplateResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(TemplateError::syntax(
                self.pos(),
                format!("expected {}, found {}", describe(kind), describe(self.peek())),
            ))
        }
    }

    fn expect_ident(&mut self) -> TemplateResult<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(TemplateError::syntax(
                self.pos(),
                format!("expected a name, found {}", describe(&other)),
            )),
        }
    }

    fn expression(&mut self) -> TemplateResult<Expr> {
        let value = self.or_expr()?;
        if self.eat_keyword("if") {
            let condition = self.or_expr()?;
            if !self.eat_keyword("else") {
                return Err(TemplateError::syntax(
                    self.pos(),
                    "conditional expression requires an 'else' branch",
                ));
            }
            let else_branch = self.expression()?;
            return Ok(Expr::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(value),
                else_branch: Box::new(else_branch),
            });
        }
        Ok(value)
    }

    fn or_expr(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat_keyword("or") {
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.not_expr()?;
        while self.eat_keyword("and") {
            let rhs = self.not_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> TemplateResult<Expr> {
        if self.eat_keyword("not") {
            let operand = self.not_expr()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> TemplateResult<Expr> {
        let first = self.additive()?;
        let mut rest = Vec::new();

        loop {
            let op = match self.peek() {
                TokenKind::EqEq => CompareOp::Eq,
                TokenKind::NotEq => CompareOp::NotEq,
                TokenKind::Lt => CompareOp::Lt,
                TokenKind::LtEq => CompareOp::LtEq,
                TokenKind::Gt => CompareOp::Gt,
                TokenKind::GtEq => CompareOp::GtEq,
                _ => break,
            };
            self.advance();
            rest.push((op, self.additive()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn additive(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.power()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::SlashSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.power()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn power(&mut self) -> TemplateResult<Expr> {
        let mut lhs = self.unary()?;
        while self.eat(&TokenKind::StarStar) {
            let rhs = self.unary()?;
            lhs = binary(BinaryOp::Pow, lhs, rhs);
        }
        Ok(lhs)
    }

    /// Signed operand followed by its filters; `-x | abs` filters the negated value
    fn unary(&mut self) -> TemplateResult<Expr> {
        let expr = self.signed()?;
        self.filters(expr)
    }

    fn signed(&mut self) -> TemplateResult<Expr> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.signed()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> TemplateResult<Expr> {
        let mut expr = self.primary()?;

        while self.eat(&TokenKind::Dot) {
            let name = self.expect_ident()?;
            expr = if self.peek() == &TokenKind::LParen {
                let args = self.call_args()?;
                Expr::MethodCall {
                    target: Box::new(expr),
                    name,
                    args,
                }
            } else {
                Expr::Attribute {
                    target: Box::new(expr),
                    name,
                }
            };
        }
        Ok(expr)
    }

    fn filters(&mut self, mut expr: Expr) -> TemplateResult<Expr> {
        while self.eat(&TokenKind::Pipe) {
            let name = self.expect_ident()?;
            let args = if self.peek() == &TokenKind::LParen {
                self.call_args()?
            } else {
                Vec::new()
            };
            expr = Expr::Filter {
                target: Box::new(expr),
                name,
                args,
            };
        }
        Ok(expr)
    }

    fn primary(&mut self) -> TemplateResult<Expr> {
        let pos = self.pos();
        match self.advance() {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Str(value) => Ok(Expr::Str(value)),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" | "True" => Ok(Expr::Bool(true)),
                "false" | "False" => Ok(Expr::Bool(false)),
                "none" | "None" => Ok(Expr::None),
                "if" | "else" | "and" | "or" | "not" => Err(TemplateError::syntax(
                    pos,
                    format!("unexpected keyword '{name}'"),
                )),
                _ if self.peek() == &TokenKind::LParen => {
                    let args = self.call_args()?;
                    Ok(Expr::Call { name, args })
                }
                _ => Ok(Expr::Variable(name)),
            },
            other => Err(TemplateError::syntax(
                pos,
                format!("unexpected {}", describe(&other)),
            )),
        }
    }

    fn call_args(&mut self) -> TemplateResult<Vec<Expr>> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(&TokenKind::Comma)?;
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {n}"),
        TokenKind::Str(s) => format!("string '{s}'"),
        TokenKind::Ident(name) => format!("'{name}'"),
        TokenKind::Plus => "'+'".to_owned(),
        TokenKind::Minus => "'-'".to_owned(),
        TokenKind::Star => "'*'".to_owned(),
        TokenKind::StarStar => "'**'".to_owned(),
        TokenKind::Slash => "'/'".to_owned(),
        TokenKind::SlashSlash => "'//'".to_owned(),
        TokenKind::Percent => "'%'".to_owned(),
        TokenKind::LParen => "'('".to_owned(),
        TokenKind::RParen => "')'".to_owned(),
        TokenKind::Comma => "','".to_owned(),
        TokenKind::Dot => "'.'".to_owned(),
        TokenKind::Pipe => "'|'".to_owned(),
        TokenKind::EqEq => "'=='".to_owned(),
        TokenKind::NotEq => "'!='".to_owned(),
        TokenKind::Lt => "'<'".to_owned(),
        TokenKind::LtEq => "'<='".to_owned(),
        TokenKind::Gt => "'>'".to_owned(),
        TokenKind::GtEq => "'>='".to_owned(),
        TokenKind::Eof => "end of expression".to_owned(),
    }
}
