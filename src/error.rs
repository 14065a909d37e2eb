//! Crate-wide error types.
//!
//! Mirrors the shape of a hand-written `Display`/`std::error::Error` enum
//! rather than reaching for `thiserror`: every variant carries the context a
//! caller needs to log or react to without further unwrapping.

use std::fmt;

/// Errors raised while building or loading a [`crate::config::Config`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `name` did not resolve to a known Information Element.
    UnknownIe { name: String },
    /// A Candidate's filter expression was empty.
    EmptyExpr { ie_name: String },
    /// A Candidate's literal value was empty.
    EmptyValue { ie_name: String },
    /// The filter compiler rejected an expression.
    FilterCompile { expr: String, reason: String },
    /// More than `CONFIG_IDS_MAX` extensions were configured.
    TooManyExtensions { count: usize, max: usize },
    /// More than `CONFIG_VALUES_MAX` candidates were configured for one extension.
    TooManyCandidates {
        ie_name: String,
        count: usize,
        max: usize,
    },
    /// A candidate literal does not fit the Extension's declared numeric type.
    LiteralOutOfRange {
        ie_name: String,
        literal: String,
        data_type: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownIe { name } => {
                write!(f, "unknown Information Element name: {name}")
            }
            ConfigError::EmptyExpr { ie_name } => {
                write!(f, "empty filter expression for extension {ie_name}")
            }
            ConfigError::EmptyValue { ie_name } => {
                write!(f, "empty candidate value for extension {ie_name}")
            }
            ConfigError::FilterCompile { expr, reason } => {
                write!(f, "could not compile filter {expr:?}: {reason}")
            }
            ConfigError::TooManyExtensions { count, max } => {
                write!(f, "{count} extensions configured, maximum is {max}")
            }
            ConfigError::TooManyCandidates {
                ie_name,
                count,
                max,
            } => {
                write!(
                    f,
                    "{count} candidates configured for extension {ie_name}, maximum is {max}"
                )
            }
            ConfigError::LiteralOutOfRange {
                ie_name,
                literal,
                data_type,
            } => {
                write!(
                    f,
                    "literal {literal:?} does not fit data type {data_type} of extension {ie_name}"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level error type for the extension engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtenderError {
    /// Configuration could not be built or loaded.
    Config(ConfigError),
    /// The input Template record was too short to contain a valid header.
    MalformedTemplate { old_id: u16, length: usize },
    /// The input message was too short to contain a valid Message Header.
    MalformedMessage { length: usize },
    /// The derived Template record failed to parse.
    TemplateParse { old_id: u16, reason: String },
    /// Allocation or capacity was exhausted while building the output message.
    Resource(String),
}

impl fmt::Display for ExtenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtenderError::Config(e) => write!(f, "configuration error: {e}"),
            ExtenderError::MalformedTemplate { old_id, length } => {
                write!(
                    f,
                    "Template {old_id} is too short to extend ({length} bytes)"
                )
            }
            ExtenderError::MalformedMessage { length } => {
                write!(f, "input message ({length} bytes) is too short for a Message Header")
            }
            ExtenderError::TemplateParse { old_id, reason } => {
                write!(f, "failed to parse extended Template {old_id}: {reason}")
            }
            ExtenderError::Resource(reason) => write!(f, "resource error: {reason}"),
        }
    }
}

impl std::error::Error for ExtenderError {}

impl From<ConfigError> for ExtenderError {
    fn from(e: ConfigError) -> Self {
        ExtenderError::Config(e)
    }
}
