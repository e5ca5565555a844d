//! Terminal output helpers

use clap::ValueEnum;
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};
use hookflow_engine::{ExecutionPlan, PlanReport, RollbackOutcome};
use owo_colors::OwoColorize;
use serde::Serialize;

/// Output format of listing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human readable tables
    #[default]
    Simple,
    /// Pretty-printed JSON
    Json,
}

/// Status indicators
#[derive(Debug, Clone, Copy)]
pub enum StatusIcon {
    /// Completed successfully
    Success,
    /// Failed
    Failure,
    /// Did not run
    Skipped,
    /// Compensated by a rollback
    RolledBack,
    /// Needs attention
    Warning,
}

impl StatusIcon {
    /// Symbol of the status
    pub fn get(self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::Failure => "✗",
            Self::Skipped => "○",
            Self::RolledBack => "↺",
            Self::Warning => "!",
        }
    }
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Table with the shared style
pub fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| Cell::new(h)).collect::<Vec<_>>());
    table
}

/// Print batches, scores and skipped hooks of a plan
pub fn print_plan(plan: &ExecutionPlan) {
    println!(
        "{} {} ({})",
        "Plan for".bold(),
        plan.trigger.cyan(),
        plan.resolution.strategy
    );
    println!("{}", plan.resolution.reason.dimmed());

    if plan.is_empty() {
        println!("{}", "No hooks to run.".yellow());
    } else {
        let mut rows = table(&["Batch", "Phase", "Hook", "Priority", "Score", "Depends on"]);
        for batch in &plan.batches {
            for hook in &batch.hooks {
                rows.add_row(vec![
                    Cell::new(batch.index),
                    Cell::new(batch.phase),
                    Cell::new(hook.name()),
                    Cell::new(hook.descriptor.base_priority),
                    Cell::new(format!("{:.3}", hook.priority_score)),
                    Cell::new(hook.plan_dependencies.join(", ")),
                ]);
            }
        }
        println!("{rows}");
    }

    for skipped in &plan.skipped {
        println!(
            "  {} {} {}",
            StatusIcon::Skipped.get().dimmed(),
            skipped.hook.dimmed(),
            format!("({})", skipped.reason).dimmed()
        );
    }
}

/// Print the outcome of every hook and every rollback
pub fn print_report(report: &PlanReport) {
    println!();
    for result in report.results.values() {
        let (icon, name) = if result.success {
            (StatusIcon::Success.get().green().to_string(), result.hook.green().to_string())
        } else {
            (StatusIcon::Failure.get().red().to_string(), result.hook.red().to_string())
        };
        print!("  {icon} {name} {}", format!("{:.1}ms", result.duration_ms).dimmed());
        if result.rolled_back {
            print!(" {}", format!("{} rolled back", StatusIcon::RolledBack.get()).yellow());
        }
        println!();
        if let Some(error) = &result.error {
            println!("      {}", error.to_string().red());
        }
    }

    for skipped in report.skipped.iter().filter(|s| !report.results.contains_key(&s.hook)) {
        println!(
            "  {} {} {}",
            StatusIcon::Skipped.get().dimmed(),
            skipped.hook.dimmed(),
            format!("({})", skipped.reason).dimmed()
        );
    }

    for outcome in &report.rollbacks {
        print_rollback(outcome);
    }

    println!();
    let summary = format!(
        "{} succeeded, {} failed, {} skipped in {:.1}ms",
        report.succeeded(),
        report.failed_hooks().len(),
        report.skipped.len(),
        report.total_execution_time_ms
    );
    if report.overall_success {
        println!("{} {}", StatusIcon::Success.get().green(), summary.green().bold());
    } else {
        println!("{} {}", StatusIcon::Failure.get().red(), summary.red().bold());
    }
}

fn print_rollback(outcome: &RollbackOutcome) {
    println!(
        "\n{} {} rollback after {}: {} compensated",
        StatusIcon::RolledBack.get().yellow(),
        outcome.scope,
        outcome.failed_hooks.join(", "),
        outcome.compensated_hooks.len()
    );
    if !outcome.nothing_to_undo.is_empty() {
        println!(
            "  {} nothing to undo for {}",
            StatusIcon::Skipped.get().dimmed(),
            outcome.nothing_to_undo.join(", ")
        );
    }
    for record in &outcome.inconsistent {
        println!(
            "  {} {} left inconsistent: {}",
            StatusIcon::Warning.get().red(),
            record.hook.red(),
            record.reason
        );
    }
}
