// Simulation Engine Module
// Seam towards the external engine that owns model databases and solver jobs

pub mod config;
pub mod file;

// Re-export key types
pub use config::EngineConfig;
pub use file::FileEngine;

use crate::options::JobOptions;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors reported by an engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error on '{path}': {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("'{path}' is not a valid model database: {source}")]
    InvalidDatabase {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("job '{0}' does not exist")]
    UnknownJob(String),

    #[error("model '{0}' does not exist")]
    UnknownModel(String),

    #[error("job '{0}' was never submitted")]
    NotSubmitted(String),

    #[error("failed to start solver for job '{job}': {source}")]
    Spawn { job: String, source: io::Error },

    #[error("job '{job}' failed (exit code: {code:?}){}", format_stderr(.stderr))]
    JobFailed {
        job: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("job '{job}' did not complete within {after:?}")]
    Timeout { job: String, after: Duration },
}

fn format_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

/// A named constant from the engine's enumeration namespace
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolicConstant {
    #[serde(rename = "constant")]
    name: String,
}

impl SymbolicConstant {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for SymbolicConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Constants accepted for job options when running against Abaqus
const ABAQUS_CONSTANTS: &[&str] = &[
    "ANALYSIS",
    "AT",
    "BOTH",
    "DEFAULT",
    "DOMAIN",
    "DOUBLE",
    "DOUBLE_CONSTRAINT_ONLY",
    "DOUBLE_PLUS_PACK",
    "FULL",
    "GIGA_BYTES",
    "IMMEDIATE",
    "LOOP",
    "MEGA_BYTES",
    "MPI",
    "ODB",
    "OFF",
    "ON",
    "PERCENTAGE",
    "RECOVER",
    "RESTART",
    "SIM",
    "SINGLE",
    "SYNTAXCHECK",
    "THREADS",
    "WAIT",
];

/// Fixed set of symbolic constant names exposed by an engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantNamespace {
    names: BTreeSet<String>,
}

impl ConstantNamespace {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The namespace of the Abaqus scripting interface job options
    pub fn abaqus() -> Self {
        Self::new(ABAQUS_CONSTANTS.iter().copied())
    }

    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
    }

    /// Exact, case-sensitive lookup
    pub fn resolve(&self, name: &str) -> Option<SymbolicConstant> {
        self.names.get(name).map(|name| SymbolicConstant { name: name.clone() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// An external engine able to open model database files
#[async_trait::async_trait]
pub trait SimulationEngine: Send + Sync {
    /// Open a model database. Engines may rewrite the file as a side effect.
    async fn open(&self, path: &Path) -> Result<Box<dyn ModelDatabase>, EngineError>;

    /// Symbolic constants recognised in job options
    fn constants(&self) -> &ConstantNamespace;
}

/// An opened model database with its job and model registries
#[async_trait::async_trait]
pub trait ModelDatabase: Send {
    fn has_job(&self, name: &str) -> bool;

    fn has_model(&self, name: &str) -> bool;

    /// Apply options to an existing job
    async fn update_job(&mut self, name: &str, options: &JobOptions) -> Result<(), EngineError>;

    /// Create a job bound to an existing model
    async fn create_job(
        &mut self,
        name: &str,
        model: &str,
        options: &JobOptions,
    ) -> Result<(), EngineError>;

    /// Start the job without waiting for it
    async fn submit(&mut self, name: &str) -> Result<(), EngineError>;

    /// Block until a submitted job finishes; failures of the job surface as errors
    async fn wait_for_completion(&mut self, name: &str) -> Result<(), EngineError>;
}
