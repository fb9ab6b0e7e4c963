// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Environment variable overlay
//!
//! `CCW_INGEST__RECONNECT_MAX_MS=3000` becomes
//! `{"ingest": {"reconnect-max-ms": 3000}}`: a double underscore separates
//! sections and single underscores map to the kebab-case key names.

use crate::error::ConfigResult;
use serde_json::Value as J;
use std::collections::HashMap;

pub const ENV_PREFIX: &str = "CCW";

/// Build the JSON overlay from `CCW_*` variables.
///
/// `source` replaces the process environment, which keeps tests hermetic.
pub fn env_overlay(source: Option<HashMap<String, String>>) -> ConfigResult<J> {
    let environment = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(source.map(|vars| vars.into_iter().collect()));

    let built = config::Config::builder().add_source(environment).build()?;
    let map = built.try_deserialize::<serde_json::Map<String, J>>()?;
    Ok(kebab_keys(J::Object(map)))
}

fn kebab_keys(value: J) -> J {
    match value {
        J::Object(map) => J::Object(
            map.into_iter()
                .map(|(k, v)| (k.replace('_', "-"), kebab_keys(v)))
                .collect(),
        ),
        other => other,
    }
}
