// Build Graph Recorder
// Records registered nodes, aliases, and integrations for hand-off to the build engine

use super::{Action, BuildEnvironment};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// Error type for graph operations
#[derive(Debug, Clone)]
pub struct GraphError {
    pub message: String,
    pub kind: GraphErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// Two different nodes declare the same target
    DuplicateTarget,
    /// Node declared without a usable target or sources
    InvalidNode,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph error: {}", self.message)
    }
}

impl std::error::Error for GraphError {}

impl GraphError {
    pub fn duplicate_target(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::DuplicateTarget,
        }
    }

    pub fn invalid_node(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::InvalidNode,
        }
    }
}

/// A registered unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildNode {
    /// Output artifact produced by the node
    pub target: PathBuf,
    /// Input artifacts the node depends on
    pub sources: Vec<PathBuf>,
    /// What the node does
    pub action: Action,
}

/// Serializable snapshot of a build graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphManifest {
    pub nodes: Vec<BuildNode>,
    pub aliases: BTreeMap<String, Vec<PathBuf>>,
    pub integrations: BTreeMap<String, PathBuf>,
}

impl GraphManifest {
    /// Pretty JSON, stable across runs for identical registrations
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// In-memory build environment recording every registration
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    nodes: Vec<BuildNode>,
    /// Quick lookup of node index by target
    target_indices: HashMap<PathBuf, usize>,
    aliases: IndexMap<String, Vec<PathBuf>>,
    integrations: BTreeMap<String, PathBuf>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an integration with an explicit program path
    pub fn with_integration(mut self, name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        self.integrations.insert(name.into(), program.into());
        self
    }

    /// Look the integration's program up on `PATH`; returns whether it was found
    pub fn detect_integration(&mut self, name: &str) -> bool {
        match which::which(name) {
            Ok(program) => {
                tracing::debug!(integration = name, program = %program.display(), "integration detected");
                self.integrations.insert(name.to_string(), program);
                true
            }
            Err(_) => false,
        }
    }

    pub fn nodes(&self) -> &[BuildNode] {
        &self.nodes
    }

    pub fn node(&self, target: &Path) -> Option<&BuildNode> {
        self.target_indices.get(target).map(|&i| &self.nodes[i])
    }

    pub fn alias(&self, name: &str) -> Option<&[PathBuf]> {
        self.aliases.get(name).map(Vec::as_slice)
    }

    pub fn integration(&self, name: &str) -> Option<&Path> {
        self.integrations.get(name).map(PathBuf::as_path)
    }

    /// Snapshot the graph for the external build engine
    pub fn manifest(&self) -> GraphManifest {
        GraphManifest {
            nodes: self.nodes.clone(),
            aliases: self
                .aliases
                .iter()
                .map(|(name, outputs)| (name.clone(), outputs.clone()))
                .collect(),
            integrations: self.integrations.clone(),
        }
    }
}

impl BuildEnvironment for BuildGraph {
    fn register_node(
        &mut self,
        target: &Path,
        sources: &[PathBuf],
        action: Action,
    ) -> Result<Vec<PathBuf>, GraphError> {
        if target.as_os_str().is_empty() {
            return Err(GraphError::invalid_node(format!(
                "{} node registered without a target",
                action.kind()
            )));
        }
        if sources.is_empty() {
            return Err(GraphError::invalid_node(format!(
                "node '{}' declares no sources",
                target.display()
            )));
        }

        let node = BuildNode {
            target: target.to_path_buf(),
            sources: sources.to_vec(),
            action,
        };

        if let Some(&existing) = self.target_indices.get(target) {
            if self.nodes[existing] == node {
                return Ok(vec![node.target]);
            }
            return Err(GraphError::duplicate_target(format!(
                "target '{}' is already produced by a different node",
                target.display()
            )));
        }

        tracing::debug!(
            target = %node.target.display(),
            action = node.action.kind(),
            "registered build node"
        );

        self.target_indices
            .insert(node.target.clone(), self.nodes.len());
        let outputs = vec![node.target.clone()];
        self.nodes.push(node);
        Ok(outputs)
    }

    fn bind_alias(&mut self, name: &str, outputs: &[PathBuf]) {
        let bound = self.aliases.entry(name.to_string()).or_default();
        for output in outputs {
            if !bound.contains(output) {
                bound.push(output.clone());
            }
        }
    }

    fn integration_available(&self, name: &str) -> bool {
        self.integrations.contains_key(name)
    }
}
