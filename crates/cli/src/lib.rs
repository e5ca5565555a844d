//! Hookflow CLI library
//!
//! This library contains all the CLI logic for hookflow, making it reusable
//! for testing and integration with other tools.

pub mod cmd;
pub mod command;
pub mod common;
pub mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use command::Command;
use common::{ResolvedPaths, RuntimeContext};
use ui::OutputFormat;

/// Hookflow - prioritized hook scheduling with conflict resolution
#[derive(Parser)]
#[command(name = "hookflow")]
#[command(about = "Plan and run prioritized hooks")]
#[command(version)]
#[command(long_about = "Plan and run prioritized hooks

Hooks bound to a trigger are scored, conflicts between them are resolved
and the survivors run in phase-ordered, dependency-respecting batches.
Failed hooks are compensated by scoped rollback.

Features:
  • Weighted priority scores from static and dynamic signals
  • Nine conflict strategies, selectable per trigger
  • Per-hook timeouts on a fixed worker pool
  • Performance history that tunes future priorities")]
pub struct Cli {
    /// Path to the config file
    #[arg(long, env = "HOOKFLOW_CONFIG", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding hook files
    #[arg(long, env = "HOOKFLOW_HOOKS_DIR", value_name = "DIR", global = true)]
    pub hooks_dir: Option<PathBuf>,

    /// Database for performance history
    #[arg(long, env = "HOOKFLOW_STATE_DB", value_name = "FILE", global = true)]
    pub state_db: Option<PathBuf>,

    /// Enable verbose output (shows DEBUG level logs)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to a file (useful for debugging)
    #[arg(long, env = "HOOKFLOW_LOG_FILE", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for hookflow CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Show the execution plan of a trigger without running it
    Plan(cmd::plan::PlanCommand),

    /// Run the hooks of a trigger
    #[command(long_about = "Run the hooks of a trigger

The plan is shown and confirmed before anything runs. Performance of every
executed hook is recorded and feeds later priority scores.

Examples:
  • hookflow run pre-commit
      → Plan and run every hook bound to pre-commit

  • hookflow run deploy build migrate --yes
      → Run only build and migrate, without confirmation

  • hookflow run deploy --strategy sequential_strict
      → Run one hook at a time for this invocation

  • hookflow run deploy --data env=prod --hint build=60:1024
      → Pass context data and a resource estimate for build")]
    Run(cmd::run::RunCommand),

    /// Re-plan a trigger whenever the hooks directory changes
    Watch(cmd::watch::WatchCommand),

    /// Inspect hook definitions
    #[command(subcommand)]
    Hooks(HooksCommands),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Tune hook priorities from recorded performance
    Optimize(cmd::optimize::OptimizeCommand),

    /// Show system metrics
    Metrics(cmd::metrics::MetricsCommand),
}

/// Commands for inspecting hooks
#[derive(Subcommand)]
pub enum HooksCommands {
    /// List configured hooks
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Simple)]
        format: OutputFormat,
    },

    /// Show detailed information about a specific hook
    Show {
        /// Name of the hook to show
        name: String,
    },
}

/// Commands for managing the configuration file
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Check the configuration file for problems
    Validate,

    /// Print the effective configuration as JSON
    Show,

    /// Set a value, addressed by a dotted key
    ///
    /// Examples:
    ///   hookflow config set max_workers 8
    ///   hookflow config set `conflict_strategies_by_trigger.deploy` `first_match`
    Set {
        /// Dotted key, e.g. `phase_configuration.cleanup.required`
        key: String,

        /// New value (JSON, or a plain string)
        value: String,
    },
}

/// Execute the command based on the command type
fn execute_command(command: Commands, context: &RuntimeContext) -> Result<()> {
    match command {
        Commands::Plan(plan_cmd) => plan_cmd.execute(context)?,
        Commands::Run(run_cmd) => run_cmd.execute(context)?,
        Commands::Watch(watch_cmd) => watch_cmd.execute(context)?,
        Commands::Hooks(hooks_cmd) => match hooks_cmd {
            HooksCommands::List { format } => cmd::hooks::run_list(context, format)?,
            HooksCommands::Show { name } => cmd::hooks::run_show(context, &name)?,
        },
        Commands::Config(config_cmd) => match config_cmd {
            // Handled before the configuration is loaded
            ConfigCommands::Init { .. } | ConfigCommands::Validate => {}
            ConfigCommands::Show => cmd::config::run_show(context)?,
            ConfigCommands::Set { key, value } => cmd::config::run_set(context, &key, &value)?,
        },
        Commands::Optimize(optimize_cmd) => {
            optimize_cmd.execute(context)?;
        }
        Commands::Metrics(metrics_cmd) => {
            metrics_cmd.execute(context)?;
        }
    }

    Ok(())
}

/// Main entry point for the CLI logic
///
/// # Errors
///
/// Returns an error if:
/// - Default paths cannot be determined
/// - Configuration loading fails
/// - Logging initialization fails
/// - Command execution fails
pub fn run(cli: Cli) -> Result<()> {
    let paths = ResolvedPaths::resolve(
        cli.config.as_deref(),
        cli.hooks_dir.as_deref(),
        cli.state_db.as_deref(),
    )?;

    // These must work on a missing or broken configuration
    match &cli.command {
        Commands::Config(ConfigCommands::Init { force }) => {
            hookflow_config::logging::init(cli.verbose, cli.log_file.as_deref())?;
            return cmd::config::run_init(&paths.config_file, *force);
        }
        Commands::Config(ConfigCommands::Validate) => {
            hookflow_config::logging::init(cli.verbose, cli.log_file.as_deref())?;
            return cmd::config::run_validate(&paths.config_file);
        }
        _ => {}
    }

    let context = RuntimeContext::load(paths)?;

    let verbose = cli.verbose || context.config.debug_logging();
    let log_file = cli
        .log_file
        .as_deref()
        .or(context.config.log_file_path.as_deref());
    hookflow_config::logging::init(verbose, log_file)?;

    tracing::debug!(
        config = %context.paths.config_file.display(),
        hooks_dir = %context.paths.hooks_dir.display(),
        state_db = %context.paths.state_db.display(),
        "Resolved paths"
    );

    execute_command(cli.command, &context)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "hookflow",
            "run",
            "deploy",
            "build",
            "migrate",
            "--yes",
            "--strategy",
            "first_match",
            "--hint",
            "build=50:256",
            "--hooks-dir",
            "/tmp/hooks",
        ])
        .unwrap();

        assert_eq!(cli.hooks_dir, Some(PathBuf::from("/tmp/hooks")));
        let Commands::Run(run) = cli.command else {
            panic!("expected run command");
        };
        assert!(run.yes);
        assert!(!run.no_rollback);
        assert_eq!(run.args.trigger, "deploy");
        assert_eq!(run.args.hooks, vec!["build", "migrate"]);
        assert_eq!(run.args.strategy.as_deref(), Some("first_match"));
    }

    #[test]
    fn test_parse_config_set() {
        let cli = Cli::try_parse_from(["hookflow", "config", "set", "max_workers", "8"]).unwrap();
        let Commands::Config(ConfigCommands::Set { key, value }) = cli.command else {
            panic!("expected config set");
        };
        assert_eq!(key, "max_workers");
        assert_eq!(value, "8");
    }
}
