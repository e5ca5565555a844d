//! Plan command
//!
//! Shows how a trigger would be executed without running any hook.

use anyhow::{Context, Result, bail};
use clap::Args;
use hookflow_core::{ConflictStrategy, ExecutionContext, ResourceHint, TimeSensitivity};
use hookflow_engine::ExecutionPlan;

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::ui::{self, OutputFormat};

/// Arguments shared by `plan` and `run`
#[derive(Debug, Clone, Args)]
pub struct TriggerArgs {
    /// Trigger that fired
    pub trigger: String,

    /// Hooks to consider (default: every hook bound to the trigger)
    pub hooks: Vec<String>,

    /// Time sensitivity of this firing (low, normal, high)
    #[arg(long, default_value = "normal")]
    pub sensitivity: String,

    /// Conflict strategy for this trigger, overriding the configuration
    #[arg(long)]
    pub strategy: Option<String>,

    /// Context data handed to hooks, as KEY=VALUE (VALUE may be JSON)
    #[arg(long = "data", value_name = "KEY=VALUE")]
    pub data: Vec<String>,

    /// Resource estimate for a hook, as HOOK=CPU_PERCENT:MEMORY_MB
    #[arg(long = "hint", value_name = "HOOK=CPU:MEM")]
    pub hints: Vec<String>,
}

impl TriggerArgs {
    /// Parsed strategy override
    pub fn strategy(&self) -> Result<Option<ConflictStrategy>> {
        self.strategy
            .as_deref()
            .map(str::parse::<ConflictStrategy>)
            .transpose()
            .context("Invalid --strategy")
    }

    /// Execution context for this firing
    pub fn execution_context(&self) -> Result<ExecutionContext> {
        let sensitivity: TimeSensitivity = self
            .sensitivity
            .parse()
            .context("Invalid --sensitivity")?;
        let mut context = ExecutionContext::new(&self.trigger).with_time_sensitivity(sensitivity);

        for entry in &self.data {
            let (key, value) = split_pair(entry, "--data")?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            context = context.with_data(key, value);
        }

        for entry in &self.hints {
            let (hook, hint) = split_pair(entry, "--hint")?;
            context = context.with_resource_hint(hook, parse_hint(hint)?);
        }

        Ok(context)
    }

    /// Build the plan
    pub fn plan(
        &self,
        context: &RuntimeContext,
        system: &hookflow_engine::PrioritySystem,
    ) -> Result<(ExecutionPlan, ExecutionContext)> {
        let execution = self.execution_context()?;
        let plan = system
            .calculate_execution_order(&self.trigger, &self.hooks, &execution)
            .with_context(|| {
                format!(
                    "Failed to plan '{}' with hooks from {}",
                    self.trigger,
                    context.paths.hooks_dir.display()
                )
            })?;
        Ok((plan, execution))
    }
}

fn split_pair<'a>(entry: &'a str, flag: &str) -> Result<(&'a str, &'a str)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("Invalid {flag} '{entry}', expected KEY=VALUE"),
    }
}

fn parse_hint(hint: &str) -> Result<ResourceHint> {
    let (cpu, memory) = hint
        .split_once(':')
        .with_context(|| format!("Invalid resource hint '{hint}', expected CPU:MEM"))?;
    let cpu: f64 = cpu
        .parse()
        .with_context(|| format!("Invalid CPU percentage '{cpu}'"))?;
    let memory: f64 = memory
        .parse()
        .with_context(|| format!("Invalid memory size '{memory}'"))?;
    Ok(ResourceHint::new(cpu, memory))
}

/// Show the execution plan of a trigger
#[derive(Debug, Args)]
pub struct PlanCommand {
    /// Trigger and planning options
    #[command(flatten)]
    pub args: TriggerArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Simple)]
    pub format: OutputFormat,
}

impl Command for PlanCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let strategy = self.args.strategy()?;
        let system =
            context.build_system(strategy.map(|s| (self.args.trigger.as_str(), s)))?;
        let (plan, _) = self.args.plan(context, &system)?;

        match self.format {
            OutputFormat::Json => ui::print_json(&plan.summary())?,
            OutputFormat::Simple => ui::print_plan(&plan),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    fn args(extra: &[&str]) -> TriggerArgs {
        TriggerArgs {
            trigger: "deploy".to_string(),
            hooks: Vec::new(),
            sensitivity: "high".to_string(),
            strategy: None,
            data: extra.iter().map(ToString::to_string).collect(),
            hints: vec!["build=40:512".to_string()],
        }
    }

    #[test]
    fn test_execution_context_from_flags() {
        let context = args(&["count=3", "env=prod"]).execution_context().unwrap();
        assert_eq!(context.time_sensitivity, TimeSensitivity::High);
        assert_eq!(context.data["count"], serde_json::json!(3));
        assert_eq!(context.data["env"], serde_json::json!("prod"));
        assert_eq!(
            context.resource_hint("build"),
            Some(ResourceHint::new(40.0, 512.0))
        );
    }

    #[test]
    fn test_malformed_flags_are_rejected() {
        assert!(args(&["novalue"]).execution_context().is_err());

        let mut bad_hint = args(&[]);
        bad_hint.hints = vec!["build=lots".to_string()];
        assert!(bad_hint.execution_context().is_err());

        let mut bad_strategy = args(&[]);
        bad_strategy.strategy = Some("coin_flip".to_string());
        assert!(bad_strategy.strategy().is_err());
    }
}
