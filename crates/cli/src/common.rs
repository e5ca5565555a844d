//! Common utilities and types shared across CLI commands

use anyhow::{Context, Result};
use hookflow_config::PrioritySystemConfig;
use hookflow_core::ConflictStrategy;
use hookflow_engine::{
    DuctProcess, HistoryStore, HookLoader, HookRegistry, PrioritySystem, RedbPersistentState,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolved locations of everything the CLI reads and writes
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    /// Configuration file (may not exist yet)
    pub config_file: PathBuf,
    /// Directory of hook files
    pub hooks_dir: PathBuf,
    /// Database holding performance history and adjustments
    pub state_db: PathBuf,
}

impl ResolvedPaths {
    /// Fill unset paths with the XDG defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a default is needed but no home directory can be
    /// determined.
    pub fn resolve(
        config_file: Option<&Path>,
        hooks_dir: Option<&Path>,
        state_db: Option<&Path>,
    ) -> Result<Self> {
        let config_file = match config_file {
            Some(path) => path.to_path_buf(),
            None => hookflow_config::default_config_file()
                .context("Could not determine the config file path, use --config")?,
        };
        let hooks_dir = match hooks_dir {
            Some(path) => path.to_path_buf(),
            None => hookflow_config::default_hooks_dir()
                .context("Could not determine the hooks directory, use --hooks-dir")?,
        };
        let state_db = match state_db {
            Some(path) => path.to_path_buf(),
            None => hookflow_config::default_state_db()
                .context("Could not determine the state database path, use --state-db")?,
        };

        Ok(Self {
            config_file,
            hooks_dir,
            state_db,
        })
    }
}

/// Runtime context for CLI commands
///
/// Holds the loaded configuration and the resolved paths so commands do not
/// resolve them again.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Shared configuration
    pub config: Arc<PrioritySystemConfig>,
    /// Resolved paths
    pub paths: ResolvedPaths,
}

impl RuntimeContext {
    /// Load the configuration file, falling back to defaults when it is missing
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but is invalid.
    pub fn load(paths: ResolvedPaths) -> Result<Self> {
        let config = PrioritySystemConfig::load_or_default(&paths.config_file)
            .with_context(|| format!("Failed to load {}", paths.config_file.display()))?;
        Ok(Self {
            config: Arc::new(config),
            paths,
        })
    }

    /// Create a context from parts
    pub fn from_parts(config: PrioritySystemConfig, paths: ResolvedPaths) -> Self {
        Self {
            config: Arc::new(config),
            paths,
        }
    }

    /// Hook loader for the hooks directory
    pub fn loader(&self) -> HookLoader {
        HookLoader::new(&self.paths.hooks_dir)
    }

    /// Load every hook file into a registry of process-backed hooks
    ///
    /// # Errors
    ///
    /// Returns an error if a hook file is invalid or the hooks do not form
    /// a valid registry.
    pub fn load_registry(&self) -> Result<HookRegistry> {
        self.loader()
            .load_registry(Arc::new(DuctProcess))
            .with_context(|| {
                format!(
                    "Failed to load hooks from {}",
                    self.paths.hooks_dir.display()
                )
            })
    }

    /// Build a priority system over the hooks directory
    ///
    /// A strategy override applies to the given trigger only.
    ///
    /// # Errors
    ///
    /// Returns an error if the hooks cannot be loaded or the system fails to
    /// start.
    pub fn build_system(
        &self,
        strategy_override: Option<(&str, ConflictStrategy)>,
    ) -> Result<PrioritySystem> {
        let mut config = (*self.config).clone();
        if let Some((trigger, strategy)) = strategy_override {
            config
                .conflict_strategies_by_trigger
                .insert(trigger.to_string(), strategy);
        }

        let system = PrioritySystem::builder()
            .config(config)
            .registry(self.load_registry()?)
            .build()
            .context("Failed to start the priority system")?;
        self.restore_state(&system)?;
        Ok(system)
    }

    fn open_store(&self) -> Result<HistoryStore<RedbPersistentState>> {
        let state = RedbPersistentState::new(&self.paths.state_db).with_context(|| {
            format!(
                "Failed to open state database {}",
                self.paths.state_db.display()
            )
        })?;
        Ok(HistoryStore::new(state))
    }

    /// Load persisted history and adjustments into a system
    ///
    /// # Errors
    ///
    /// Returns an error if the state database cannot be read.
    pub fn restore_state(&self, system: &PrioritySystem) -> Result<()> {
        if !self.paths.state_db.exists() {
            return Ok(());
        }
        let store = self.open_store()?;
        let history = store.load_history().context("Failed to load history")?;
        let adjustments = store
            .load_adjustments()
            .context("Failed to load priority adjustments")?;
        tracing::debug!(
            hooks = history.hooks.len(),
            adjustments = adjustments.len(),
            "Restored persisted state"
        );
        system.history().import(history);
        system.calculator().replace_adjustments(adjustments);
        Ok(())
    }

    /// Save history and adjustments of a system
    ///
    /// # Errors
    ///
    /// Returns an error if the state database cannot be written.
    pub fn persist_state(&self, system: &PrioritySystem) -> Result<()> {
        let store = self.open_store()?;
        store
            .save_history(&system.history().export())
            .context("Failed to save history")?;
        store
            .save_adjustments(&system.calculator().adjustments())
            .context("Failed to save priority adjustments")?;
        Ok(())
    }
}
