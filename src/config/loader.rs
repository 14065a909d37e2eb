//! YAML configuration loading.
//!
//! Deserializes the `ids: [{ id, values: [{ expr, value }] }]` schema into a
//! validated [`Config`] using `serde` + `serde_yaml`.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::ie::IeManager;

use super::{Config, ConfigBuilder};

/// One configured candidate value, as written in YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateSpec {
    pub expr: String,
    pub value: String,
}

/// One configured Extension, as written in YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionSpec {
    pub id: String,
    pub values: Vec<CandidateSpec>,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigDocument {
    pub ids: Vec<ExtensionSpec>,
}

/// Parse and validate a YAML configuration document.
pub fn from_yaml(text: &str, ie_manager: &dyn IeManager) -> Result<Config, ConfigError> {
    let document: ConfigDocument =
        serde_yaml::from_str(text).map_err(|e| ConfigError::FilterCompile {
            expr: text.to_string(),
            reason: format!("invalid configuration document: {e}"),
        })?;

    let mut builder: ConfigBuilder = Config::builder();
    for extension in document.ids {
        let candidates: Vec<(&str, &str)> = extension
            .values
            .iter()
            .map(|c| (c.expr.as_str(), c.value.as_str()))
            .collect();
        builder = builder.with_extension(&extension.id, candidates, ie_manager)?;
    }
    Ok(builder.build()?)
}
