// Campaign Service Library
// Parametric simulation campaigns: build-graph expansion and job submission

pub mod build;
pub mod campaign;
pub mod engine;
pub mod options;
pub mod parameters;
pub mod submit;
pub mod substitute;

// Re-export parameter types
pub use parameters::{Axis, Combination, ParameterError, ParameterSet};

// Re-export build graph types
pub use build::{Action, BuildEnvironment, BuildGraph, BuildNode, GraphError, GraphManifest};

// Re-export expansion types
pub use campaign::{expand, Campaign, ExpandError, Workflow};

// Re-export engine types
pub use engine::{
    ConstantNamespace, EngineConfig, EngineError, FileEngine, ModelDatabase, SimulationEngine,
    SymbolicConstant,
};

// Re-export submission types
pub use options::{load_json_options, JobOptions, JobSpec, OptionValue, OptionsError};
pub use submit::{JobSubmitter, Resolution, SubmissionOutcome, SubmitError};
pub use substitute::{apply_substitution, SubstituteError};
