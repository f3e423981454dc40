//! Tracing setup for the harness binary.
//!
//! The library only emits events; nothing here runs unless the embedding
//! binary (or a test) asks for it.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global subscriber.
///
/// `level` overrides `RUST_LOG`; with neither present the filter defaults to
/// `info` plus debug for this crate. `file` adds an append-mode plain-text
/// layer next to the console one.
pub fn init(level: Option<&str>, file: Option<PathBuf>) -> Result<()> {
    let env_filter = if let Some(level) = level {
        EnvFilter::try_new(level)?
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,minicluster=debug"))
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_ansi(true)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(path) = file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        let file_layer = fmt::layer()
            .with_writer(std::sync::Arc::new(file))
            .with_target(true)
            .with_level(true)
            .with_ansi(false);

        registry.with(file_layer).init();
    } else {
        registry.init();
    }

    tracing::info!("logging initialized");
    Ok(())
}
