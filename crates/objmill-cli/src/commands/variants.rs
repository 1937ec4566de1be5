//! Variants command - list what can be built

use anyhow::Result;
use objmill_build::{BuildOptions, VariantConfig};
use objmill_config::Config;

pub fn run(config: &Config, json: bool) -> Result<()> {
    let variants = VariantConfig::all(&config.project.variants)?;
    let options = BuildOptions::default();

    if json {
        let list: Vec<_> = variants
            .iter()
            .map(|v| {
                serde_json::json!({
                    "name": v.name,
                    "build_type": v.build_type,
                    "compiler": v.compiler,
                    "final_tool": v.final_tool,
                    "output": v.output(&options).display().to_string(),
                    "builtin": v.is_builtin(),
                })
            })
            .collect();
        println!("{}", serde_json::Value::Array(list));
        return Ok(());
    }

    println!(
        "{:<16} {:<12} {:<10} {:<10} OUTPUT",
        "VARIANT", "BUILD TYPE", "CC", "FINAL"
    );
    for variant in &variants {
        println!(
            "{:<16} {:<12} {:<10} {:<10} {}",
            variant.name,
            variant.build_type,
            variant.compiler,
            variant.final_tool,
            variant.output(&options).display()
        );
    }
    Ok(())
}
