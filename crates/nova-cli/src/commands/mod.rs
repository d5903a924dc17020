//! CLI command implementations

pub mod dispatch;
pub mod job;
pub mod poll;
pub mod serve;

use anyhow::{Context, Result};
use nova_forge::{Dispatcher, ForgeConfig};
use std::path::Path;

/// Load config (an explicit file, or the usual layers) and wire a dispatcher
pub fn load_dispatcher(config_path: Option<&Path>) -> Result<Dispatcher> {
    let config = match config_path {
        Some(path) => ForgeConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ForgeConfig::load().context("Failed to load config")?,
    };
    Dispatcher::from_config(config).context("Failed to initialize dispatcher")
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
