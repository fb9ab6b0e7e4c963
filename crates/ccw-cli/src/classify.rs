// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `ccw classify`: run lines through the classifier

use anyhow::{Context, Result};
use ccw_classifier::ClassificationCache;
use ccw_config::EngineConfig;
use clap::Args;
use std::io::{BufRead, Write};

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    /// Lines to classify; read from stdin when none are given
    pub lines: Vec<String>,
}

impl ClassifyArgs {
    pub fn run(&self, config: EngineConfig) -> Result<()> {
        let cache = ClassificationCache::new(config.classifier.cache_capacity);
        let mut stdout = std::io::stdout().lock();

        if self.lines.is_empty() {
            for line in std::io::stdin().lock().lines() {
                let line = line.context("Failed to read stdin")?;
                writeln!(stdout, "{}", classify_to_json(&cache, &line)?)?;
            }
        } else {
            for line in &self.lines {
                writeln!(stdout, "{}", classify_to_json(&cache, line)?)?;
            }
        }
        Ok(())
    }
}

/// One compact JSON document per line
pub fn classify_to_json(cache: &ClassificationCache, line: &str) -> Result<String> {
    let result = cache.classify(line);
    serde_json::to_string(&*result).context("Failed to serialize classification")
}
