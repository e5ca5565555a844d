//! Optimize command
//!
//! Runs an optimization pass over the persisted performance history and
//! saves the resulting priority adjustments.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use hookflow_engine::{OptimizationReport, SLOW_HOOK_THRESHOLD_MS};
use owo_colors::OwoColorize;

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::ui::{self, OutputFormat, StatusIcon};

/// Tune hook priorities from recorded performance
#[derive(Debug, Args)]
pub struct OptimizeCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Simple)]
    pub format: OutputFormat,
}

impl Command for OptimizeCommand {
    type Output = OptimizationReport;

    fn execute(&self, context: &RuntimeContext) -> Result<OptimizationReport> {
        let system = context.build_system(None)?;
        let report = system.optimize_system_performance();
        context.persist_state(&system)?;

        match self.format {
            OutputFormat::Json => ui::print_json(&report)?,
            OutputFormat::Simple => print_optimization(&report),
        }
        Ok(report)
    }
}

fn print_optimization(report: &OptimizationReport) {
    if report.performance.is_empty() {
        println!("{}", "No performance history recorded yet.".yellow());
    } else {
        let mut table = ui::table(&["Hook", "Runs", "Success", "Avg duration", "Adjustment"]);
        for (hook, stats) in &report.performance {
            let duration = format!("{:.1}ms", stats.avg_duration_ms);
            let duration = if stats.avg_duration_ms > SLOW_HOOK_THRESHOLD_MS {
                Cell::new(duration).fg(comfy_table::Color::Red)
            } else {
                Cell::new(duration)
            };
            table.add_row(vec![
                Cell::new(hook),
                Cell::new(stats.executions),
                Cell::new(format!("{:.0}%", stats.success_rate * 100.0)),
                duration,
                Cell::new(
                    report
                        .priority_adjustments
                        .get(hook)
                        .map(|value| format!("{value:+.2}"))
                        .unwrap_or_default(),
                ),
            ]);
        }
        println!("{table}");
    }

    if report.actions_taken.is_empty() {
        println!("{} No changes needed", StatusIcon::Success.get().green());
    }
    for action in &report.actions_taken {
        println!("{} {}", StatusIcon::Success.get().green(), action);
    }
    for hook in &report.unreliable_hooks {
        println!(
            "{} {} is unreliable",
            StatusIcon::Warning.get().yellow(),
            hook.yellow()
        );
    }

    let usage = &report.resources.current_usage;
    println!(
        "\n{} CPU {:.1}%, memory {:.1}%",
        "Resources:".bold(),
        usage.cpu_percent,
        usage.memory_percent
    );
    for advice in &report.resources.recommendations {
        println!("  {} {}", StatusIcon::Warning.get().yellow(), advice);
    }
}
