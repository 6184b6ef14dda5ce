use std::fs;

use anyhow::{Context, Result, bail};
use shared::config::Config;

/// Writes `gavel.<format>` with the default settings to the current directory.
///
/// # Errors
/// Returns an error if the format is unsupported or if writing the file fails.
pub fn generate_config(format: &str) -> Result<()> {
    let config = Config::with_defaults();
    let (file_name, serialized) = match format {
        "yaml" | "yml" => ("gavel.yaml", serde_yml::to_string(&config)?),
        "json" => ("gavel.json", serde_json::to_string_pretty(&config)?),
        "toml" => ("gavel.toml", toml::to_string_pretty(&config)?),
        other => bail!("unsupported format {other:?}; use yaml, json or toml"),
    };

    fs::write(file_name, serialized)
        .with_context(|| format!("failed to write {file_name}"))?;

    println!("Configuration file '{file_name}' generated successfully.");
    Ok(())
}
