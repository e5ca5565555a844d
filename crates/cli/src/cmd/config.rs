//! Configuration commands
//!
//! Create, validate, show and edit the priority system configuration file.

use anyhow::{Context, Result, bail};
use hookflow_config::PrioritySystemConfig;
use owo_colors::OwoColorize;
use serde_json::Value;
use std::path::Path;

use crate::common::RuntimeContext;
use crate::ui::{self, StatusIcon};

/// Write the default configuration
pub fn run_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    PrioritySystemConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!(
        "{} Created configuration at {}",
        StatusIcon::Success.get().green(),
        path.display().cyan()
    );
    Ok(())
}

/// Check the configuration file and report every problem
pub fn run_validate(path: &Path) -> Result<()> {
    if !path.exists() {
        println!(
            "{} No configuration at {}, defaults apply.",
            StatusIcon::Warning.get().yellow(),
            path.display()
        );
        return Ok(());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: PrioritySystemConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let issues = config.validate();
    if issues.is_empty() {
        println!(
            "{} {} is valid",
            StatusIcon::Success.get().green(),
            path.display()
        );
        return Ok(());
    }

    for issue in &issues {
        println!("  {} {}", StatusIcon::Failure.get().red(), issue);
    }
    bail!("{} configuration issue(s) found", issues.len())
}

/// Print the effective configuration
pub fn run_show(context: &RuntimeContext) -> Result<()> {
    ui::print_json(&*context.config)
}

/// Set one value, addressed by a dotted key
///
/// The value is parsed as JSON and kept as a string when that fails, so
/// `max_workers 8` and `log_level DEBUG` both work.
pub fn run_set(context: &RuntimeContext, key: &str, value: &str) -> Result<()> {
    let updated = set_value(&context.config, key, value)?;
    let path = &context.paths.config_file;
    updated
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!(
        "{} {} = {}",
        StatusIcon::Success.get().green(),
        key.cyan(),
        value
    );
    Ok(())
}

fn set_value(config: &PrioritySystemConfig, key: &str, value: &str) -> Result<PrioritySystemConfig> {
    let value: Value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));

    let mut document = serde_json::to_value(config)?;
    let mut target = &mut document;
    let segments: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        bail!("Empty configuration key");
    };

    for segment in parents {
        let Value::Object(fields) = target else {
            bail!("'{key}' does not name a configuration section");
        };
        target = fields
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    let Value::Object(fields) = target else {
        bail!("'{key}' does not name a configuration section");
    };
    if last.is_empty() {
        bail!("Invalid configuration key '{key}'");
    }
    fields.insert((*last).to_string(), value);

    config
        .merged_with(&document)
        .with_context(|| format!("Invalid value for '{key}'"))
}
