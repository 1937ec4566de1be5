//! Redep command - rescan header dependencies

use anyhow::{Context, Result};
use objmill_build::{BuildConfig, Builder};
use objmill_config::Config;

pub fn run(config: &Config, quiet: bool) -> Result<()> {
    let builder = Builder::new(BuildConfig::from_config(config))?;
    let scanned = builder
        .redep()
        .context("Failed to recalculate dependencies")?;

    if !quiet {
        println!("Successfully recalculated dependencies of {} file(s)", scanned);
    }
    Ok(())
}
