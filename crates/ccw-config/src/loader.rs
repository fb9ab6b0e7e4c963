// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! TOML loading

use crate::error::{ConfigError, ConfigResult};
use serde_json::Value as J;
use std::path::Path;

/// Parse a TOML document into the JSON form used for merging
pub fn parse_toml_to_json(toml_str: &str, origin: &Path) -> ConfigResult<J> {
    let value: toml::Value = toml_str.parse::<toml::Value>().map_err(|source| ConfigError::Toml {
        path: origin.to_path_buf(),
        source,
    })?;
    Ok(serde_json::to_value(value)?)
}

pub fn read_layer_from_file(path: &Path) -> ConfigResult<J> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_toml_to_json(&content, path)
}
