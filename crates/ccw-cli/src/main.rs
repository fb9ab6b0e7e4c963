// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{Context, Result};
use ccw_cli::{Cli, Parser};
use ccw_config::EngineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.init("ccw")?;

    let resolved = EngineConfig::load(cli.config.clone()).context("Failed to load configuration")?;
    tracing::debug!(layers = ?resolved.layers, "Configuration resolved");

    cli.command.run(resolved.config).await
}
