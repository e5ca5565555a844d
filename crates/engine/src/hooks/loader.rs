//! Hook discovery and loading
//!
//! Loads command hooks from TOML files in a hooks directory. A file holds
//! either a single hook at the top level or several under `[[hooks]]`.

use super::command::CommandHook;
use super::descriptor::HookDescriptor;
use super::registry::HookRegistry;
use hookflow_core::{Error, ExternalProcess, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

/// A hook as written in a hook file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookSpec {
    /// Scheduling metadata
    #[serde(flatten)]
    pub descriptor: HookDescriptor,

    /// Command line to run
    pub cmd: String,

    /// Command line that undoes `cmd`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_cmd: Option<String>,

    /// Extra environment variables
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    /// Working directory, relative to the hook file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct HookFile {
    hooks: Vec<HookSpec>,
}

/// A parsed hook and the file it came from
#[derive(Debug, Clone)]
pub struct LoadedHook {
    /// Parsed definition
    pub spec: HookSpec,
    /// Source file
    pub path: PathBuf,
}

impl LoadedHook {
    /// Directory the command runs in
    #[must_use]
    pub fn working_dir(&self) -> Option<PathBuf> {
        let base = self.path.parent()?;
        Some(match &self.spec.working_dir {
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        })
    }
}

/// Discover and load hooks from the hooks directory
#[derive(Debug, Clone)]
pub struct HookLoader {
    hooks_dir: PathBuf,
}

impl HookLoader {
    /// Create a loader for a hooks directory
    #[must_use]
    pub fn new(hooks_dir: impl Into<PathBuf>) -> Self {
        Self {
            hooks_dir: hooks_dir.into(),
        }
    }

    /// Hooks directory
    #[must_use]
    pub fn hooks_dir(&self) -> &Path {
        &self.hooks_dir
    }

    /// Check if hooks directory exists
    #[must_use]
    pub fn exists(&self) -> bool {
        self.hooks_dir.exists()
    }

    /// Load all hook definitions
    ///
    /// Files are read in file name order; hidden files and editor backups are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed.
    pub fn load(&self) -> Result<Vec<LoadedHook>> {
        use rayon::prelude::*;

        if !self.hooks_dir.exists() {
            tracing::debug!(
                "Hooks directory does not exist: {}",
                self.hooks_dir.display()
            );
            return Ok(Vec::new());
        }

        let mut file_paths: Vec<PathBuf> = fs::read_dir(&self.hooks_dir)?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|path| path.is_file())
            .filter(|path| is_hook_file(path))
            .collect();

        // Numeric prefixes decide the order hooks are registered in
        file_paths.sort();

        let loaded: Result<Vec<Vec<LoadedHook>>> = file_paths
            .par_iter()
            .map(|path| {
                tracing::debug!("Loading hook file: {}", path.display());
                load_hook_file(path)
            })
            .collect();

        Ok(loaded?.into_iter().flatten().collect())
    }

    /// Load hooks and wrap them as command hooks in a registry
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the hooks do not form a valid
    /// registry.
    pub fn load_registry(&self, process: Arc<dyn ExternalProcess>) -> Result<HookRegistry> {
        let fingerprint = self.fingerprint()?;
        let mut builder = HookRegistry::builder().fingerprint(fingerprint);

        for loaded in self.load()? {
            let spec = &loaded.spec;
            let working_dir = loaded.working_dir();
            let body = CommandHook::new(
                &spec.cmd,
                spec.rollback_cmd.as_deref(),
                &spec.env,
                working_dir.as_deref(),
                spec.descriptor.timeout_ms.map(Duration::from_millis),
                Arc::clone(&process),
            )
            .map_err(|e| Error::HookFile {
                path: loaded.path.clone(),
                message: e.to_string(),
            })?;
            builder = builder.register(loaded.spec.descriptor, Arc::new(body));
        }

        builder.build()
    }

    /// Hash of every file under the hooks directory
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read.
    pub fn fingerprint(&self) -> Result<Vec<u8>> {
        if !self.hooks_dir.exists() {
            return Ok(Vec::new());
        }
        compute_directory_hash(&self.hooks_dir)
    }
}

fn is_hook_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if file_name.starts_with('.')
        || file_name.ends_with('~')
        || file_name.to_lowercase().ends_with(".swp")
    {
        return false;
    }
    if path.extension().and_then(|e| e.to_str()) != Some("toml") {
        tracing::debug!("Skipping non-TOML file: {}", path.display());
        return false;
    }
    true
}

fn load_hook_file(path: &Path) -> Result<Vec<LoadedHook>> {
    let file_error = |message: String| Error::HookFile {
        path: path.to_path_buf(),
        message,
    };

    let content = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
    let table: toml::Table = toml::from_str(&content).map_err(|e| file_error(e.to_string()))?;

    let specs = if table.get("hooks").is_some_and(toml::Value::is_array) {
        toml::from_str::<HookFile>(&content)
            .map_err(|e| file_error(e.to_string()))?
            .hooks
    } else {
        vec![toml::from_str::<HookSpec>(&content).map_err(|e| file_error(e.to_string()))?]
    };

    Ok(specs
        .into_iter()
        .map(|spec| LoadedHook {
            spec,
            path: path.to_path_buf(),
        })
        .collect())
}

/// Hash file paths and contents under a directory
fn compute_directory_hash(dir: &Path) -> Result<Vec<u8>> {
    use rayon::prelude::*;

    let file_paths: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();

    let file_hashes: Result<Vec<(String, Vec<u8>)>> = file_paths
        .par_iter()
        .map(|path| {
            let rel_path = path
                .strip_prefix(dir)
                .map_err(|_| Error::HookFile {
                    path: path.clone(),
                    message: "path is outside the hooks directory".to_string(),
                })?
                .to_string_lossy()
                .to_string();
            let content = fs::read(path).map_err(|e| Error::HookFile {
                path: path.clone(),
                message: e.to_string(),
            })?;
            Ok((rel_path, Sha256::digest(&content).to_vec()))
        })
        .collect();

    let mut file_hashes = file_hashes?;
    file_hashes.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (path, hash) in file_hashes {
        hasher.update(path.as_bytes());
        hasher.update(&hash);
    }
    Ok(hasher.finalize().to_vec())
}

/// Detects changes to the hooks directory between runs
pub struct RegistryWatcher {
    loader: HookLoader,
    process: Arc<dyn ExternalProcess>,
    fingerprint: Option<Vec<u8>>,
}

impl std::fmt::Debug for RegistryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryWatcher")
            .field("loader", &self.loader)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl RegistryWatcher {
    /// Watch the loader's directory, starting from a known fingerprint
    #[must_use]
    pub fn new(
        loader: HookLoader,
        process: Arc<dyn ExternalProcess>,
        fingerprint: Option<Vec<u8>>,
    ) -> Self {
        Self {
            loader,
            process,
            fingerprint,
        }
    }

    /// Reload when the directory changed since the last poll
    ///
    /// # Errors
    ///
    /// Returns an error if the changed hooks fail to load. The stored
    /// fingerprint is left untouched so the next poll retries.
    pub fn poll(&mut self) -> Result<Option<HookRegistry>> {
        let current = self.loader.fingerprint()?;
        if self.fingerprint.as_deref() == Some(current.as_slice()) {
            return Ok(None);
        }

        let registry = self.loader.load_registry(Arc::clone(&self.process))?;
        tracing::info!(
            hooks = registry.len(),
            dir = %self.loader.hooks_dir().display(),
            "Hooks changed, registry reloaded"
        );
        self.fingerprint = registry.fingerprint().map(<[u8]>::to_vec);
        Ok(Some(registry))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::hooks::command::DuctProcess;
    use hookflow_core::{ExecutionPhase, PriorityLevel};
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_missing_directory_loads_nothing() {
        let temp = TempDir::new().unwrap();
        let loader = HookLoader::new(temp.path().join("hooks"));
        assert!(!loader.exists());
        assert!(loader.load().unwrap().is_empty());
        assert!(loader.fingerprint().unwrap().is_empty());
    }

    #[test]
    fn test_single_and_multi_hook_files() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "10-auth.toml",
            r#"
name = "auth"
priority = "critical"
triggers = ["deploy"]
provides = ["authentication"]
tags = ["validation"]
cmd = "echo auth"
"#,
        );
        write(
            temp.path(),
            "20-build.toml",
            r#"
[[hooks]]
name = "compile"
triggers = ["deploy"]
depends_on = ["authentication"]
cmd = "make build"
rollback_cmd = "make clean"
working_dir = "src"

[[hooks]]
name = "notify"
priority = "low"
triggers = ["deploy"]
phase = "finalization"
cmd = "notify-send done"

[hooks.env]
CHANNEL = "ops"
"#,
        );

        let loaded = HookLoader::new(temp.path()).load().unwrap();
        let names: Vec<&str> = loaded
            .iter()
            .map(|h| h.spec.descriptor.name.as_str())
            .collect();
        assert_eq!(names, vec!["auth", "compile", "notify"]);

        let auth = &loaded[0].spec.descriptor;
        assert_eq!(auth.base_priority, PriorityLevel::Critical);
        assert_eq!(auth.effective_phase(), ExecutionPhase::PreValidation);

        let compile = &loaded[1];
        assert_eq!(compile.spec.rollback_cmd.as_deref(), Some("make clean"));
        assert_eq!(compile.working_dir(), Some(temp.path().join("src")));

        let notify = &loaded[2];
        assert_eq!(notify.spec.env["CHANNEL"], "ops");
        assert_eq!(notify.working_dir(), Some(temp.path().to_path_buf()));
    }

    #[test]
    fn test_hidden_and_backup_files_skipped() {
        let temp = TempDir::new().unwrap();
        let hook = "name = \"h\"\ntriggers = [\"t\"]\ncmd = \"true\"\n";
        write(temp.path(), ".hidden.toml", hook);
        write(temp.path(), "backup.toml~", hook);
        write(temp.path(), "notes.txt", "not a hook");
        write(temp.path(), "real.toml", hook);

        let loaded = HookLoader::new(temp.path()).load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].path, temp.path().join("real.toml"));
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "broken.toml", "name = \"x\"\ntriggers = [\"t\"]\n");

        let err = HookLoader::new(temp.path()).load().unwrap_err();
        match err {
            Error::HookFile { path, .. } => assert_eq!(path, temp.path().join("broken.toml")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_registry_validates_hooks() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "a.toml",
            "name = \"a\"\ntriggers = [\"t\"]\ndepends_on = [\"b\"]\ncmd = \"true\"\n",
        );
        write(
            temp.path(),
            "b.toml",
            "name = \"b\"\ntriggers = [\"t\"]\ndepends_on = [\"a\"]\ncmd = \"true\"\n",
        );

        let err = HookLoader::new(temp.path())
            .load_registry(Arc::new(DuctProcess))
            .unwrap_err();
        assert!(matches!(err, Error::DependencyCycle { .. }));
    }

    #[test]
    fn test_watcher_reloads_only_on_change() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.toml", "name = \"a\"\ntriggers = [\"t\"]\ncmd = \"true\"\n");

        let loader = HookLoader::new(temp.path());
        let registry = loader.load_registry(Arc::new(DuctProcess)).unwrap();
        assert_eq!(registry.len(), 1);

        let mut watcher = RegistryWatcher::new(
            loader,
            Arc::new(DuctProcess),
            registry.fingerprint().map(<[u8]>::to_vec),
        );
        assert!(watcher.poll().unwrap().is_none());

        write(temp.path(), "b.toml", "name = \"b\"\ntriggers = [\"t\"]\ncmd = \"true\"\n");
        let reloaded = watcher.poll().unwrap().unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(watcher.poll().unwrap().is_none());
    }
}
