//! Metrics command

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use hookflow_engine::{ResourceTrend, SystemMetrics};

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::ui::{self, OutputFormat};

/// Show sizes, settings and resource state of the priority system
#[derive(Debug, Args)]
pub struct MetricsCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Simple)]
    pub format: OutputFormat,
}

impl Command for MetricsCommand {
    type Output = SystemMetrics;

    fn execute(&self, context: &RuntimeContext) -> Result<SystemMetrics> {
        let system = context.build_system(None)?;
        let metrics = system.metrics();

        match self.format {
            OutputFormat::Json => ui::print_json(&metrics)?,
            OutputFormat::Simple => print_metrics(&metrics),
        }
        Ok(metrics)
    }
}

fn trend(trend: ResourceTrend) -> &'static str {
    match trend {
        ResourceTrend::Increasing => "increasing",
        ResourceTrend::Decreasing => "decreasing",
        ResourceTrend::Stable => "stable",
    }
}

fn print_metrics(metrics: &SystemMetrics) {
    let monitor = &metrics.resource_monitor;
    let rows: Vec<(&str, String)> = vec![
        (
            "Collected at",
            metrics
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        ),
        ("Registered hooks", metrics.registry_size.to_string()),
        ("Tracked hooks", metrics.tracked_hooks.to_string()),
        ("History samples", metrics.performance_history_size.to_string()),
        ("Rollbacks", metrics.rollback_history_size.to_string()),
        (
            "Conflict strategy",
            metrics.default_conflict_strategy.to_string(),
        ),
        (
            "Dynamic adjustment",
            metrics.dynamic_adjustment_enabled.to_string(),
        ),
        ("Max workers", metrics.max_workers.to_string()),
        (
            "Max execution time",
            format!("{}ms", metrics.max_execution_time_ms),
        ),
        ("Resource monitor", if monitor.active { "active" } else { "fixed" }.to_string()),
        (
            "CPU",
            format!(
                "{:.1}% ({})",
                monitor.current.cpu_percent,
                trend(monitor.trends.cpu)
            ),
        ),
        (
            "Memory",
            format!(
                "{:.1}% of {:.0} MiB ({})",
                monitor.current.memory_percent,
                monitor.current.memory_total_mb,
                trend(monitor.trends.memory)
            ),
        ),
    ];

    let mut table = ui::table(&["Metric", "Value"]);
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    for (hook, adjustment) in &metrics.priority_adjustments {
        table.add_row(vec![
            Cell::new(format!("Adjustment: {hook}")),
            Cell::new(format!("{adjustment:+.2}")),
        ]);
    }
    println!("{table}");
}
