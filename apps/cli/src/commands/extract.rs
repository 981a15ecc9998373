//! Extract command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::Path;

pub fn execute(archive: &Path, dest: &Path, json_output: bool) -> Result<()> {
    let files = booth_training::extract_images(archive, dest)
        .with_context(|| format!("Failed to extract {}", archive.display()))?;

    if json_output {
        let out = json!({ "dest": dest, "files": files });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for file in &files {
        println!("  {}", file.display().to_string().dimmed());
    }
    println!("{}", format!("✓ Extracted {} images into {}", files.len(), dest.display()).green().bold());
    Ok(())
}
