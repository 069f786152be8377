// Build Graph Module
// Registration interface towards the external build engine and an in-memory recorder

pub mod action;
pub mod graph;

// Re-export key types
pub use action::Action;
pub use graph::{BuildGraph, BuildNode, GraphError, GraphErrorKind, GraphManifest};

use std::path::{Path, PathBuf};

/// Capabilities the campaign expander needs from a build engine.
///
/// Passed explicitly into expansion instead of living in a global
/// construction environment.
pub trait BuildEnvironment {
    /// Register a node producing `target` from `sources`; returns the declared outputs
    fn register_node(
        &mut self,
        target: &Path,
        sources: &[PathBuf],
        action: Action,
    ) -> Result<Vec<PathBuf>, GraphError>;

    /// Bind a named alias to a list of node outputs
    fn bind_alias(&mut self, name: &str, outputs: &[PathBuf]);

    /// Whether the named compute-engine integration is configured
    fn integration_available(&self, name: &str) -> bool;
}
