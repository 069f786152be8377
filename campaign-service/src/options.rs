// Job Options
// Declarative job options from JSON with symbolic constant resolution

use crate::engine::{ConstantNamespace, SymbolicConstant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Model name used when none is given on the command line
pub const DEFAULT_MODEL_NAME: &str = "BulgeModel-1";

/// Reserved option key carrying the CPU count
pub const CPUS_OPTION: &str = "numCpus";

/// Keys that name structural arguments and never come from an options file
pub const STRUCTURAL_KEYS: &[&str] = &["name", "model", "input_file", "job_name", "model_name"];

/// Errors that can occur when loading an options file
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to read options file '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse options file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("options file '{0}' must contain a JSON object at the top level")]
    NotAnObject(PathBuf),

    #[error("option '{key}' has an unsupported value type ({kind}); expected string, number, or boolean")]
    UnsupportedValue { key: String, kind: &'static str },
}

/// A single job option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Constant(SymbolicConstant),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Integer(i) => write!(f, "{}", i),
            OptionValue::Float(x) => write!(f, "{}", x),
            OptionValue::Text(s) => f.write_str(s),
            OptionValue::Constant(c) => write!(f, "{}", c),
        }
    }
}

/// Ordered option map passed to job creation or update
pub type JobOptions = BTreeMap<String, OptionValue>;

/// Convert one JSON value, resolving strings that name a known constant
pub fn resolve_json_value(
    key: &str,
    value: &serde_json::Value,
    constants: &ConstantNamespace,
) -> Result<OptionValue, OptionsError> {
    use serde_json::Value;

    match value {
        Value::Bool(b) => Ok(OptionValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(OptionValue::Integer(i)),
            None => Ok(OptionValue::Float(n.as_f64().unwrap_or(f64::NAN))),
        },
        Value::String(s) => Ok(constants
            .resolve(s)
            .map(OptionValue::Constant)
            .unwrap_or_else(|| OptionValue::Text(s.clone()))),
        Value::Null => Err(OptionsError::UnsupportedValue {
            key: key.to_string(),
            kind: "null",
        }),
        Value::Array(_) => Err(OptionsError::UnsupportedValue {
            key: key.to_string(),
            kind: "array",
        }),
        Value::Object(_) => Err(OptionsError::UnsupportedValue {
            key: key.to_string(),
            kind: "object",
        }),
    }
}

/// Parse options from JSON text
pub fn parse_json_options(
    source: &str,
    path: &Path,
    constants: &ConstantNamespace,
) -> Result<JobOptions, OptionsError> {
    let document: serde_json::Value =
        serde_json::from_str(source).map_err(|source| OptionsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let object = document
        .as_object()
        .ok_or_else(|| OptionsError::NotAnObject(path.to_path_buf()))?;

    object
        .iter()
        .map(|(key, value)| Ok((key.clone(), resolve_json_value(key, value, constants)?)))
        .collect()
}

/// Load a flat JSON options file
pub fn load_json_options(
    path: &Path,
    constants: &ConstantNamespace,
) -> Result<JobOptions, OptionsError> {
    let source = fs::read_to_string(path).map_err(|source| OptionsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_json_options(&source, path, constants)
}

/// Runtime record of one submission attempt
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub input_file: PathBuf,
    pub job_name: String,
    pub model_name: String,
    pub cpus: Option<u32>,
    /// Options loaded from the JSON file, already constant-resolved
    pub json_options: JobOptions,
}

impl JobSpec {
    pub fn new(input_file: impl Into<PathBuf>, job_name: impl Into<String>) -> Self {
        Self {
            input_file: input_file.into(),
            job_name: job_name.into(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            cpus: None,
            json_options: JobOptions::new(),
        }
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_cpus(mut self, cpus: Option<u32>) -> Self {
        self.cpus = cpus;
        self
    }

    pub fn with_json_options(mut self, options: JobOptions) -> Self {
        self.json_options = options;
        self
    }

    /// Merged options: JSON first, then the CPU count on top.
    ///
    /// Structural keys are dropped so they cannot override the job name,
    /// model, or input file.
    pub fn options(&self) -> JobOptions {
        let mut options = JobOptions::new();

        for (key, value) in &self.json_options {
            if STRUCTURAL_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "ignoring structural argument in options file");
                continue;
            }
            options.insert(key.clone(), value.clone());
        }

        if let Some(cpus) = self.cpus {
            options.insert(CPUS_OPTION.to_string(), OptionValue::Integer(i64::from(cpus)));
        }

        options
    }
}
