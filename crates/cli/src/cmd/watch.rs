//! Watch command
//!
//! Keeps a priority system alive, reloading the hooks directory whenever it
//! changes and re-planning the trigger after every reload.

use anyhow::{Result, bail};
use clap::Args;
use hookflow_engine::{DuctProcess, RegistryWatcher};
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;

use crate::cmd::plan::TriggerArgs;
use crate::command::Command;
use crate::common::RuntimeContext;
use crate::ui;

/// Re-plan a trigger whenever the hooks directory changes
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Trigger and planning options
    #[command(flatten)]
    pub args: TriggerArgs,

    /// Seconds between checks of the hooks directory
    #[arg(long, default_value_t = 2)]
    pub interval: u64,

    /// Execute the plan after every reload instead of only showing it
    #[arg(long)]
    pub run: bool,
}

impl Command for WatchCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        if !context.config.enable_hot_reload {
            bail!("Hot reload is disabled, set enable_hot_reload to true to watch hooks");
        }
        if self.interval == 0 {
            bail!("--interval must be greater than 0");
        }

        let strategy = self.args.strategy()?;
        let system =
            context.build_system(strategy.map(|s| (self.args.trigger.as_str(), s)))?;
        let fingerprint = system.registry().fingerprint().map(<[u8]>::to_vec);
        let mut watcher =
            RegistryWatcher::new(context.loader(), Arc::new(DuctProcess), fingerprint);

        println!(
            "Watching {} (Ctrl-C to stop)",
            context.paths.hooks_dir.display().cyan()
        );
        self.cycle(context, &system)?;

        loop {
            std::thread::sleep(Duration::from_secs(self.interval));
            match watcher.poll() {
                Ok(Some(registry)) => {
                    system.replace_registry(registry);
                    println!("\n{}", "Hooks changed, re-planning".bold());
                    if let Err(e) = self.cycle(context, &system) {
                        println!("{} {e:#}", ui::StatusIcon::Failure.get().red());
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Failed to reload hooks: {e}");
                }
            }
        }
    }
}

impl WatchCommand {
    fn cycle(&self, context: &RuntimeContext, system: &hookflow_engine::PrioritySystem) -> Result<()> {
        let (plan, execution) = self.args.plan(context, system)?;
        ui::print_plan(&plan);

        if self.run && !plan.is_empty() {
            let report = system.execute_with_priority(&plan, &execution);
            ui::print_report(&report);
            if let Err(e) = context.persist_state(system) {
                tracing::warn!("Failed to persist performance history: {e:#}");
            }
        }
        Ok(())
    }
}
