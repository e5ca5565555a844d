//! Hook management commands
//!
//! Lists and inspects the hooks defined in the hooks directory.

use anyhow::{Context, Result};
use comfy_table::Cell;
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::common::RuntimeContext;
use crate::ui::{self, OutputFormat, StatusIcon};
use hookflow_engine::{HookSpec, LoadedHook};

#[derive(Serialize)]
struct HookListing<'a> {
    hooks_dir: &'a std::path::Path,
    hooks: Vec<ListedHook<'a>>,
}

#[derive(Serialize)]
struct ListedHook<'a> {
    #[serde(flatten)]
    spec: &'a HookSpec,
    file: &'a std::path::Path,
    effective_phase: hookflow_core::ExecutionPhase,
}

/// List configured hooks
pub fn run_list(context: &RuntimeContext, format: OutputFormat) -> Result<()> {
    let loader = context.loader();

    if !loader.exists() {
        println!("{}", "No hooks directory found.".yellow());
        println!(
            "Create {} and add TOML hook files to get started.",
            loader.hooks_dir().display().cyan()
        );
        return Ok(());
    }

    let hooks = loader.load().context("Failed to load hooks")?;

    match format {
        OutputFormat::Json => {
            let listing = HookListing {
                hooks_dir: loader.hooks_dir(),
                hooks: hooks
                    .iter()
                    .map(|h| ListedHook {
                        spec: &h.spec,
                        file: &h.path,
                        effective_phase: h.spec.descriptor.effective_phase(),
                    })
                    .collect(),
            };
            ui::print_json(&listing)?;
        }
        OutputFormat::Simple => {
            println!(
                "Hooks directory: {}",
                loader.hooks_dir().display().cyan()
            );
            if hooks.is_empty() {
                println!("{}", "No hooks configured.".yellow());
                return Ok(());
            }

            let mut table = ui::table(&["Hook", "Priority", "Phase", "Triggers", "Depends on"]);
            for hook in &hooks {
                let descriptor = &hook.spec.descriptor;
                table.add_row(vec![
                    Cell::new(&descriptor.name),
                    Cell::new(descriptor.base_priority),
                    Cell::new(descriptor.effective_phase()),
                    Cell::new(join(&descriptor.triggers)),
                    Cell::new(join(&descriptor.depends_on)),
                ]);
            }
            println!("{table}");
            println!("Total hooks: {}", hooks.len());
        }
    }

    Ok(())
}

/// Show detailed information about a specific hook
pub fn run_show(context: &RuntimeContext, hook_name: &str) -> Result<()> {
    let loader = context.loader();
    let hooks = loader.load().context("Failed to load hooks")?;

    let Some(hook) = hooks.iter().find(|h| h.spec.descriptor.name == hook_name) else {
        println!(
            "{} {}",
            StatusIcon::Warning.get(),
            format!("Hook '{hook_name}' not found.").yellow()
        );
        println!(
            "\nUse {} to list all available hooks.",
            "hookflow hooks list".cyan()
        );
        return Ok(());
    };

    print_hook(hook);

    match context.build_system(None) {
        Ok(system) => {
            if let Some(stats) = system.history().live_stats().get(hook_name) {
                println!("{}", "Performance:".bold());
                println!("  Executions: {}", stats.executions);
                println!("  Success rate: {:.1}%", stats.success_rate * 100.0);
                println!("  Average duration: {:.1}ms", stats.avg_duration_ms);
                let adjustment = system.calculator().adjustment(hook_name);
                if adjustment != 0.0 {
                    println!("  Priority adjustment: {adjustment:+.2}");
                }
                println!();
            }
        }
        Err(e) => tracing::debug!("No performance data for {hook_name}: {e:#}"),
    }
    Ok(())
}

fn print_hook(hook: &LoadedHook) {
    let spec = &hook.spec;
    let descriptor = &spec.descriptor;

    println!();
    println!("{} {}", "Hook:".bold(), descriptor.name.cyan());
    if !descriptor.description.is_empty() {
        println!("{} {}", "Description:".bold(), descriptor.description);
    }
    println!("{} {}", "File:".bold(), hook.path.display());
    println!("{} {}", "Priority:".bold(), descriptor.base_priority);
    println!("{} {}", "Phase:".bold(), descriptor.effective_phase());
    println!("{} {}", "Triggers:".bold(), join(&descriptor.triggers));
    if !descriptor.depends_on.is_empty() {
        println!("{} {}", "Depends on:".bold(), join(&descriptor.depends_on));
    }
    if !descriptor.provides.is_empty() {
        println!("{} {}", "Provides:".bold(), join(&descriptor.provides));
    }
    if !descriptor.tags.is_empty() {
        println!("{} {}", "Tags:".bold(), join(&descriptor.tags));
    }
    if let Some(timeout_ms) = descriptor.timeout_ms {
        println!("{} {timeout_ms}ms", "Timeout:".bold());
    }
    if let Some(hint) = descriptor.resources {
        println!(
            "{} {}% CPU, {} MiB",
            "Resources:".bold(),
            hint.cpu_percent,
            hint.memory_mb
        );
    }

    println!("{} {}", "Command:".bold(), spec.cmd);
    if let Some(rollback) = &spec.rollback_cmd {
        println!("{} {}", "Rollback:".bold(), rollback);
    }
    if let Some(dir) = hook.working_dir() {
        println!("{} {}", "Working directory:".bold(), dir.display());
    }
    if !spec.env.is_empty() {
        println!("\n{}", "Environment variables:".bold());
        for (key, value) in &spec.env {
            println!("  {} = {}", key.cyan(), value);
        }
    }
    println!();
}

fn join(items: &std::collections::BTreeSet<String>) -> String {
    items.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
