// Copyright 2025 the Rowflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine-wide configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::numeric::NumberFormat;

/// Error returned when a configuration document cannot be read.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document is malformed or has fields of the wrong type.
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Options shared by every stage of a pipeline.
///
/// Unknown fields are ignored so adapter settings can live in the same file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Whether the adapters' input carries a header row.
    ///
    /// The engine itself does not read files; this is carried through for adapters.
    pub has_header: bool,
    /// Absorb recoverable per-cell failures instead of aborting.
    ///
    /// When set, unparseable numeric or time cells are skipped, replaced with
    /// [`default_value`](Self::default_value), or cause their row to be dropped, depending on the
    /// stage. When unset, the first such cell aborts the stage with its row and column.
    pub ignore_errors: bool,
    /// Value written where a tolerant stage has nothing to compute.
    pub default_value: String,
    /// Separators used when reading numbers.
    pub number_format: NumberFormat,
    /// Trim whitespace from join keys before comparing them.
    pub trim_keys: bool,
    /// Joins source column and function name in generated column names (`price_mean`).
    pub name_separator: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            ignore_errors: false,
            default_value: String::new(),
            number_format: NumberFormat::default(),
            trim_keys: true,
            name_separator: String::from("_"),
        }
    }
}

impl EngineOptions {
    /// Reads options from a TOML document; absent fields keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Sets [`ignore_errors`](Self::ignore_errors).
    pub fn with_ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    /// Sets [`default_value`](Self::default_value).
    pub fn with_default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = value.into();
        self
    }

    /// Sets [`number_format`](Self::number_format).
    pub fn with_number_format(mut self, format: NumberFormat) -> Self {
        self.number_format = format;
        self
    }

    /// Builds a generated column name: `{column}{separator}{suffix}`.
    pub fn derived_name(&self, column: &str, suffix: &str) -> String {
        format!("{column}{}{suffix}", self.name_separator)
    }
}
