//! Package command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

pub fn execute(dir: &Path, out: &Path, json_output: bool) -> Result<()> {
    let artifact = booth_training::package_directory(dir, out)
        .with_context(|| format!("Failed to package {}", dir.display()))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&artifact)?);
        return Ok(());
    }

    println!("{}", format!("✓ Packaged {}", dir.display()).green().bold());
    println!("  {:<8} {}", "archive", artifact.path.display());
    println!("  {:<8} {}", "sha256", artifact.sha256.dimmed());
    Ok(())
}
