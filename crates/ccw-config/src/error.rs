// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing TOML in {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment overlay: {0}")]
    Env(#[from] config::ConfigError),

    #[error("JSON conversion: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value at `{path}`: {message}")]
    Invalid { path: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
