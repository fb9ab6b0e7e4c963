// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging initialization for ccw binaries
//!
//! All ccw crates log through `tracing`. Binaries call one of the `init*`
//! functions once at startup (usually through [`CliLoggingArgs::init`]).
//! `RUST_LOG` always overrides the default level.
//!
//! Console logs go to stderr because stdout carries the rendered execution
//! output.

mod args;

pub use args::{CliLogLevel, CliLoggingArgs, LogFormat};

use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing::Level;

/// Platform log location for a component:
/// - macOS: `~/Library/Logs/ccw/<component>.log`
/// - elsewhere: `<data dir>/ccw/<component>.log`
pub fn standard_log_path(component: &str) -> PathBuf {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|home| home.join("Library").join("Logs"))
    } else {
        dirs::data_dir()
    };
    base.or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("ccw")
        .join(format!("{component}.log"))
}

/// Log to stderr
pub fn init(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, io::stderr)
}

/// Log to a file, creating parent directories as needed
pub fn init_to_file(
    component: &str,
    default_level: Level,
    format: LogFormat,
    log_path: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = std::fs::OpenOptions::new().create(true).append(true).open(log_path)?;
    init_with_writer(component, default_level, format, std::sync::Mutex::new(log_file))
}

/// Build the filter used when `RUST_LOG` is unset: the default level for
/// everything, including every `ccw_*` target and the component itself
pub fn default_filter(component: &str, default_level: Level) -> String {
    let target = component.replace('-', "_");
    format!("{default_level},{target}={default_level}")
}

pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> anyhow::Result<()>
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(component, default_level)));

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).json();
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);
            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("ccw-cli", Level::DEBUG), "DEBUG,ccw_cli=DEBUG");
    }

    #[test]
    fn test_standard_log_path_names_component() {
        let path = standard_log_path("ccw-cli");
        assert!(path.ends_with("ccw/ccw-cli.log"));
    }

    #[test]
    fn test_init_with_writer_captures_and_rejects_second_init() {
        let buffer = Buffer::default();
        let sink = buffer.clone();
        init_with_writer("ccw-test", Level::INFO, LogFormat::Json, move || sink.clone()).unwrap();

        tracing::info!(execution_id = "exec-1", "captured");
        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("captured"));
        assert!(output.contains("exec-1"));

        // A global subscriber can only be installed once per process
        assert!(init_with_writer("ccw-test", Level::INFO, LogFormat::Plaintext, io::sink).is_err());
    }
}
