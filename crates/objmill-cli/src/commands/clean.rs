//! Clean command - remove every cached object

use anyhow::{Context, Result};
use objmill_build::{BuildConfig, Builder};
use objmill_config::Config;

pub fn run(config: &Config, quiet: bool) -> Result<()> {
    let builder = Builder::new(BuildConfig::from_config(config))?;
    let removed = builder
        .clean()
        .context("Failed to remove cached objects")?;

    if !quiet {
        println!("Removed {} object file(s)", removed);
    }
    Ok(())
}
