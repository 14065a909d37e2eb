//! Configuration model: which Information Elements to add, and how to pick
//! their value per Data Record.
//!
//! A consuming, `#[must_use]` builder validates everything up front so the
//! hot path never has to handle a malformed configuration.

use crate::error::ConfigError;
use crate::filter::{self, CompiledFilter};
use crate::ie::{IeDef, IeManager};
use crate::wire::FieldSpecifier;

pub mod loader;

/// Maximum number of configured Extensions (added Information Elements).
///
/// A `Vec`-backed config has no hard layout constraint on this count, but
/// the limit is kept as a configured invariant against runaway configs.
pub const CONFIG_IDS_MAX: usize = 64;

/// Maximum number of Candidates configured per Extension.
pub const CONFIG_VALUES_MAX: usize = 16;

/// One candidate value for an Extension: a filter, and the value to use
/// when it's the first Candidate whose filter matches.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub(crate) filter: CompiledFilter,
    pub(crate) encoded_value: Vec<u8>,
}

impl Candidate {
    pub fn filter(&self) -> &CompiledFilter {
        &self.filter
    }

    pub fn encoded_value(&self) -> &[u8] {
        &self.encoded_value
    }
}

/// One Information Element to add to every Data Record, with an ordered
/// list of Candidates evaluated first-match-wins.
#[derive(Debug, Clone)]
pub struct Extension {
    pub(crate) ie: IeDef,
    pub(crate) candidates: Vec<Candidate>,
}

impl Extension {
    pub fn ie(&self) -> IeDef {
        self.ie
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Wire length this Extension's value field needs: its declared fixed
    /// width, or the longest configured candidate value for variable-length
    /// types.
    pub fn max_value_len(&self) -> u16 {
        match self.ie.data_type.size_of() {
            Some(fixed) => fixed,
            None => self
                .candidates
                .iter()
                .map(|c| c.encoded_value.len() as u16)
                .max()
                .unwrap_or(0),
        }
    }

    /// Wire length this Extension adds to a derived Template's field
    /// specifier list plus worst-case per-record payload: the field
    /// specifier itself (4 bytes, non-enterprise) plus the value bytes
    /// (plus the variable-length prefix, 1 or 3 bytes, when applicable).
    pub fn max_record_contribution(&self) -> usize {
        let value_len = self.max_value_len();
        let prefix = if self.ie.data_type.size_of().is_none() {
            if value_len as usize <= 254 { 1 } else { 3 }
        } else {
            0
        };
        prefix + value_len as usize
    }
}

/// A fully validated configuration: the ordered list of Extensions to add to
/// every Data Record.
#[derive(Debug, Clone, Default)]
pub struct Config {
    extensions: Vec<Extension>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// Upper bound on bytes a single Data Record grows by once every
    /// configured Extension is appended, plus the Template-side growth in
    /// field specifiers. Used by the message builder to size its output
    /// buffer up front.
    pub fn max_extension_len(&self) -> usize {
        self.extensions
            .iter()
            .map(|e| FieldSpecifier::wire_len_for_ie(e.ie) + e.max_record_contribution())
            .sum()
    }
}

/// Consuming builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    extensions: Vec<Extension>,
}

impl ConfigBuilder {
    /// Add an Extension: the Information Element to append, and its ordered
    /// `(filter_expr, literal_value)` candidates.
    #[must_use]
    pub fn with_extension(
        mut self,
        ie_name: &str,
        candidates: Vec<(&str, &str)>,
        ie_manager: &dyn IeManager,
    ) -> Result<Self, ConfigError> {
        if self.extensions.len() >= CONFIG_IDS_MAX {
            return Err(ConfigError::TooManyExtensions {
                count: self.extensions.len() + 1,
                max: CONFIG_IDS_MAX,
            });
        }
        if candidates.len() > CONFIG_VALUES_MAX {
            return Err(ConfigError::TooManyCandidates {
                ie_name: ie_name.to_string(),
                count: candidates.len(),
                max: CONFIG_VALUES_MAX,
            });
        }

        let ie = ie_manager
            .resolve(ie_name)
            .ok_or_else(|| ConfigError::UnknownIe {
                name: ie_name.to_string(),
            })?;

        let mut compiled = Vec::with_capacity(candidates.len());
        for (expr, value) in candidates {
            if expr.trim().is_empty() {
                return Err(ConfigError::EmptyExpr {
                    ie_name: ie_name.to_string(),
                });
            }
            if value.is_empty() {
                return Err(ConfigError::EmptyValue {
                    ie_name: ie_name.to_string(),
                });
            }
            let filter = filter::compile(expr, ie_manager)?;
            let encoded_value =
                ie.data_type
                    .encode_literal(value)
                    .ok_or_else(|| ConfigError::LiteralOutOfRange {
                        ie_name: ie_name.to_string(),
                        literal: value.to_string(),
                        data_type: ie.data_type.to_string(),
                    })?;
            compiled.push(Candidate {
                filter,
                encoded_value,
            });
        }

        self.extensions.push(Extension {
            ie,
            candidates: compiled,
        });
        Ok(self)
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        Ok(Config {
            extensions: self.extensions,
        })
    }
}
