// Build Actions
// Descriptors for the work a registered node performs

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use std::path::PathBuf;

/// Action attached to a build node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Copy a template, rewriting `@key@` placeholders
    Substitute {
        /// Placeholder name to replacement text, in axis order
        substitutions: IndexMap<String, String>,
        /// Per-combination directory receiving the rendered file
        build_subdirectory: PathBuf,
    },
    /// Run the job submitter against a model file
    Simulate {
        /// Executable or script that submits the job
        entry_point: PathBuf,
        /// Arguments forwarded to the entry point
        options: Vec<String>,
    },
}

impl Action {
    /// Short name used in logs and manifests
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Substitute { .. } => "substitute",
            Action::Simulate { .. } => "simulate",
        }
    }

    /// Render the action as a single command line for display
    pub fn command_line(&self) -> String {
        match self {
            Action::Substitute {
                substitutions,
                build_subdirectory,
            } => {
                let mut parts = vec![format!("substitute -> {}", build_subdirectory.display())];
                parts.extend(substitutions.iter().map(|(k, v)| format!("{}={}", k, v)));
                parts.join(" ")
            }
            Action::Simulate {
                entry_point,
                options,
            } => {
                let mut line = entry_point.display().to_string();
                for option in options {
                    line.push(' ');
                    line.push_str(option);
                }
                line
            }
        }
    }
}
