//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use smartmark_core::Config;

use crate::load_config;
use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config = load_config(config_path)?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "supabase_url": config.supabase_url,
                    "supabase_anon_key": config.supabase_anon_key.as_deref().map(mask),
                    "site_url": config.site_url,
                    "realtime_enabled": config.realtime_enabled,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:          {}", config.data_dir.display());
            println!(
                "  supabase_url:      {}",
                config.supabase_url.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  supabase_anon_key: {}",
                config
                    .supabase_anon_key
                    .as_deref()
                    .map(mask)
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  site_url:          {}", config.site_url);
            println!("  realtime_enabled:  {}", config.realtime_enabled);
            println!(
                "  log_file:          {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    config.set_value(&key, &value)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "supabase_anon_key" {
        mask(&value)
    } else {
        value
    };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

/// Show only the start of a key
fn mask(key: &str) -> String {
    let visible: String = key.chars().take(6).collect();
    if visible.len() < key.len() {
        format!("{}...", visible)
    } else {
        visible
    }
}
