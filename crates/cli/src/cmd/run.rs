//! Run command
//!
//! Plans a trigger, executes the plan and persists what was learned.

use anyhow::{Result, bail};
use clap::Args;
use owo_colors::OwoColorize;

use crate::cmd::plan::TriggerArgs;
use crate::command::Command;
use crate::common::RuntimeContext;
use crate::ui::{self, OutputFormat};

/// Execute the hooks of a trigger
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Trigger and planning options
    #[command(flatten)]
    pub args: TriggerArgs,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Do not compensate failed hooks
    #[arg(long)]
    pub no_rollback: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Simple)]
    pub format: OutputFormat,
}

impl Command for RunCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        if !context.config.enabled {
            bail!(
                "The priority system is disabled in {}",
                context.paths.config_file.display()
            );
        }

        let strategy = self.args.strategy()?;
        let system =
            context.build_system(strategy.map(|s| (self.args.trigger.as_str(), s)))?;
        let (plan, execution) = self.args.plan(context, &system)?;
        let execution = execution.with_rollback(!self.no_rollback);

        if plan.is_empty() {
            if self.format == OutputFormat::Json {
                ui::print_json(&plan.summary())?;
            } else {
                println!(
                    "{}",
                    format!("No hooks to run for '{}'.", self.args.trigger).yellow()
                );
            }
            return Ok(());
        }

        if self.format == OutputFormat::Simple {
            ui::print_plan(&plan);
        }

        // Confirm unless --yes is specified
        if !self.yes {
            use dialoguer::{Confirm, theme::ColorfulTheme};

            let confirmed = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("Run {} hooks?", plan.hook_count()))
                .default(true)
                .interact()?;

            if !confirmed {
                println!("Cancelled.");
                return Ok(());
            }
        }

        let report = system.execute_with_priority(&plan, &execution);

        if system.config().performance_monitoring_enabled
            && let Err(e) = context.persist_state(&system)
        {
            tracing::warn!("Failed to persist performance history: {e:#}");
        }

        match self.format {
            OutputFormat::Json => ui::print_json(&report)?,
            OutputFormat::Simple => ui::print_report(&report),
        }

        if !report.overall_success {
            bail!(
                "Trigger '{}' failed: {}",
                report.trigger,
                report.failed_hooks().join(", ")
            );
        }
        Ok(())
    }
}
