// Engine Configuration
// Solver command, shell, and wait timeout loaded from YAML with environment overrides

use super::EngineError;

use serde::{Deserialize, Serialize};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the solver command template
pub const SOLVER_COMMAND_ENV: &str = "CAMPAIGN_SOLVER_COMMAND";

/// Environment variable setting the wait timeout in seconds (0 disables it)
pub const WAIT_TIMEOUT_ENV: &str = "CAMPAIGN_WAIT_TIMEOUT_SECS";

/// Configuration for the file-backed engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Command template run through the shell on submit.
    ///
    /// `{job}`, `{model}` and `{database}` are replaced; job options are
    /// appended as `key=value` arguments.
    pub solver_command: String,

    /// How long to wait for a job before killing it (None = wait forever)
    pub wait_timeout_secs: Option<u64>,

    /// Constant names accepted in addition to the built-in namespace
    pub extra_constants: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            solver_command: "abaqus job={job} interactive".to_string(),
            wait_timeout_secs: None,
            extra_constants: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Default config location: ~/.campaign/engine.yaml
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".campaign").join("engine.yaml"))
    }

    /// Read a YAML config file
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load configuration: explicit file, else the default file if present,
    /// else built-in defaults; then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, EngineError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(command) = lookup(SOLVER_COMMAND_ENV).filter(|c| !c.trim().is_empty()) {
            self.solver_command = command;
        }

        if let Some(raw) = lookup(WAIT_TIMEOUT_ENV) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                EngineError::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    WAIT_TIMEOUT_ENV, raw
                ))
            })?;
            self.wait_timeout_secs = if secs == 0 { None } else { Some(secs) };
        }

        Ok(())
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
