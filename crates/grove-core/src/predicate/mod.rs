//! Predicate format language
//!
//! Parse a format string (optionally with `%@` placeholders) into a
//! [`Predicate`], bind it to an entity, then evaluate it against
//! snapshots in memory.

mod ast;
mod eval;
mod lexer;
mod parser;
mod validate;

pub use ast::{CompareOp, ComparePredicate, Operand, Predicate};

use crate::errors::{ExError, ExErrorKind};
use crate::model::{EntityDescription, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredicateError {
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { position: usize, ch: char },

    #[error("unterminated string literal starting at position {position}")]
    UnterminatedString { position: usize },

    #[error("invalid number '{text}' at position {position}")]
    InvalidNumber { position: usize, text: String },

    #[error("invalid modifier '{text}' at position {position}")]
    InvalidModifier { position: usize, text: String },

    #[error("expected {expected} at position {position}, found {found}")]
    UnexpectedToken {
        position: usize,
        expected: &'static str,
        found: String,
    },

    #[error("expected {expected} but the predicate ended")]
    UnexpectedEnd { expected: &'static str },

    #[error("no argument supplied for placeholder {index}")]
    MissingArgument { index: usize },

    #[error("{supplied} arguments supplied but only {used} placeholders present")]
    UnusedArguments { used: usize, supplied: usize },

    #[error("entity '{entity}' has no property '{key}'")]
    UnknownKey { entity: String, key: String },

    #[error("'{key}' expects {expected}, found {found}")]
    KindMismatch {
        key: String,
        expected: String,
        found: String,
    },

    #[error("operator {op} is not supported on '{key}'")]
    UnsupportedOperator { key: String, op: CompareOp },
}

impl From<PredicateError> for ExError {
    fn from(err: PredicateError) -> Self {
        let ex = ExError::new(ExErrorKind::InvalidPredicate).with_message(err.to_string());
        match err {
            PredicateError::UnknownKey { entity, key } => {
                ex.with_entity(entity).with_attribute(key)
            }
            PredicateError::KindMismatch { key, .. }
            | PredicateError::UnsupportedOperator { key, .. } => ex.with_attribute(key),
            _ => ex,
        }
    }
}

impl Predicate {
    /// Parse a predicate format string
    pub fn parse(format: &str) -> Result<Self, PredicateError> {
        parser::parse(format, &[])
    }

    /// Parse a format string, substituting `%@` placeholders in order
    pub fn parse_with_args(format: &str, args: &[Value]) -> Result<Self, PredicateError> {
        parser::parse(format, args)
    }

    /// Check keys and literals against `entity`, normalizing literals
    pub fn bind(self, entity: &EntityDescription) -> Result<Self, PredicateError> {
        validate::bind(self, entity)
    }
}
