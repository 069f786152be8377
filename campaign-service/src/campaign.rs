// Campaign Expansion
// Turns a parameter sweep into substitution and simulation build nodes

use crate::build::{Action, BuildEnvironment, GraphError};
use crate::parameters::{ParameterError, ParameterSet};
use crate::substitute::rendered_name;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Integration required unless the campaign file names another one
pub const DEFAULT_INTEGRATION: &str = "abaqus";

/// Job submitter invoked by simulation nodes unless overridden
pub const DEFAULT_ENTRY_POINT: &str = "submit-job";

/// Errors that abort campaign expansion
#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("'{integration}' program not found in the build environment")]
    Configuration { integration: String },

    #[error("failed to read campaign file '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid campaign file '{path}': {message}")]
    Invalid { path: PathBuf, message: String },

    #[error(transparent)]
    Parameters(#[from] ParameterError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Campaign file contents
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CampaignFile {
    model: String,
    template: PathBuf,
    parameters: ParameterSet,
    #[serde(default)]
    build_dir: Option<PathBuf>,
    #[serde(default)]
    workflow_name: Option<String>,
    #[serde(default)]
    entry_point: Option<PathBuf>,
    #[serde(default)]
    integration: Option<String>,
}

/// A parametric simulation campaign
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Campaign {
    /// Model identifier, first component of every identity string
    pub model: String,
    /// Alias bound to every output of the campaign
    pub workflow_name: String,
    /// Directory receiving per-combination outputs
    pub build_dir: PathBuf,
    /// Solver input template with `@axis@` placeholders
    pub template: PathBuf,
    /// Job submitter invoked by simulation nodes
    pub entry_point: PathBuf,
    /// Compute-engine integration that must be configured
    pub integration: String,
    pub parameters: ParameterSet,
}

impl Campaign {
    /// New campaign rooted at `build_dir`; the workflow is named after its last component
    pub fn new(
        model: impl Into<String>,
        template: impl Into<PathBuf>,
        build_dir: impl Into<PathBuf>,
        parameters: ParameterSet,
    ) -> Self {
        let build_dir = build_dir.into();
        Self {
            model: model.into(),
            workflow_name: workflow_name_for(&build_dir),
            build_dir,
            template: template.into(),
            entry_point: PathBuf::from(DEFAULT_ENTRY_POINT),
            integration: DEFAULT_INTEGRATION.to_string(),
            parameters,
        }
    }

    pub fn with_workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = name.into();
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<PathBuf>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_integration(mut self, integration: impl Into<String>) -> Self {
        self.integration = integration.into();
        self
    }

    /// Parse a YAML campaign; relative paths resolve against `base_dir`
    pub fn from_yaml(source: &str, path: &Path, base_dir: &Path) -> Result<Self, ExpandError> {
        let file: CampaignFile =
            serde_yaml::from_str(source).map_err(|e| ExpandError::Invalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if file.model.trim().is_empty() {
            return Err(ExpandError::Invalid {
                path: path.to_path_buf(),
                message: "model must not be empty".to_string(),
            });
        }

        let build_dir = base_dir.join(file.build_dir.unwrap_or_else(|| PathBuf::from(".")));
        let mut campaign = Campaign::new(
            file.model,
            base_dir.join(file.template),
            build_dir,
            file.parameters,
        );
        if let Some(name) = file.workflow_name {
            campaign.workflow_name = name;
        }
        if let Some(entry_point) = file.entry_point {
            campaign.entry_point = entry_point;
        }
        if let Some(integration) = file.integration {
            campaign.integration = integration;
        }
        Ok(campaign)
    }

    /// Load a YAML campaign file
    pub fn from_file(path: &Path) -> Result<Self, ExpandError> {
        let source = fs::read_to_string(path).map_err(|source| ExpandError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::from_yaml(&source, path, base_dir)
    }
}

/// Last path component, or "workflow" when there is none
fn workflow_name_for(build_dir: &Path) -> String {
    build_dir
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(name) => Some(name.to_string_lossy().to_string()),
            _ => None,
        })
        .last()
        .unwrap_or_else(|| "workflow".to_string())
}

/// Everything registered for one campaign
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Workflow {
    /// Alias name bound to `outputs`
    pub name: String,
    /// One identity string per combination, in iteration order
    pub identities: Vec<String>,
    /// Declared outputs of every registered node, in registration order
    pub outputs: Vec<PathBuf>,
}

/// Register substitution and simulation nodes for every combination.
///
/// Fails before registering anything when the campaign's integration is
/// not available in `env`.
pub fn expand<E: BuildEnvironment>(env: &mut E, campaign: &Campaign) -> Result<Workflow, ExpandError> {
    if !env.integration_available(&campaign.integration) {
        return Err(ExpandError::Configuration {
            integration: campaign.integration.clone(),
        });
    }

    let mut workflow = Workflow {
        name: campaign.workflow_name.clone(),
        ..Default::default()
    };
    let input_name = rendered_name(&campaign.template);

    for combination in campaign.parameters.combinations() {
        let identity = combination.identity(&campaign.model);
        tracing::info!(simulation = %identity, "adding simulation");

        // Substitution: template -> <build_dir>/<identity>/<input>
        let subdirectory = campaign.build_dir.join(&identity);
        let outputs = env.register_node(
            &subdirectory.join(&input_name),
            std::slice::from_ref(&campaign.template),
            Action::Substitute {
                substitutions: combination.substitutions(),
                build_subdirectory: subdirectory,
            },
        )?;
        workflow.outputs.extend(outputs);

        // Simulation: entry point + model file -> <build_dir>/<identity>.odb
        let model_file = campaign.build_dir.join(format!("{}.cae", identity));
        let outputs = env.register_node(
            &campaign.build_dir.join(format!("{}.odb", identity)),
            &[campaign.entry_point.clone(), model_file.clone()],
            Action::Simulate {
                entry_point: campaign.entry_point.clone(),
                options: vec![
                    "--input-file".to_string(),
                    model_file.to_string_lossy().to_string(),
                    "--job-name".to_string(),
                    identity.clone(),
                    "--model-name".to_string(),
                    campaign.model.clone(),
                ],
            },
        )?;
        workflow.outputs.extend(outputs);

        workflow.identities.push(identity);
    }

    env.bind_alias(&workflow.name, &workflow.outputs);
    tracing::info!(
        workflow = %workflow.name,
        simulations = workflow.identities.len(),
        "campaign registered"
    );

    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildGraph;
    use crate::parameters::Axis;

    use std::collections::HashSet;

    fn symbolic_campaign() -> Campaign {
        // Values stand in for the a/b/c/d placeholders of the documented example
        let parameters = ParameterSet::new(vec![
            Axis::new("density", vec![1.0, 2.0]),
            Axis::new("ym", vec![3.0, 4.0]),
        ])
        .unwrap();
        Campaign::new("BM", "/src/BM.inp.in", "build/bulge", parameters)
    }

    fn configured_graph() -> BuildGraph {
        BuildGraph::new().with_integration("abaqus", "/usr/bin/abaqus")
    }

    #[test]
    fn test_example_campaign() {
        let mut graph = configured_graph();
        let workflow = expand(&mut graph, &symbolic_campaign()).unwrap();

        assert_eq!(
            workflow.identities,
            vec![
                "BM_density_1.0_ym_3.0",
                "BM_density_1.0_ym_4.0",
                "BM_density_2.0_ym_3.0",
                "BM_density_2.0_ym_4.0",
            ]
        );
        assert_eq!(graph.nodes().len(), 8);

        let substitutions = graph
            .nodes()
            .iter()
            .filter(|n| matches!(n.action, Action::Substitute { .. }))
            .count();
        assert_eq!(substitutions, 4);
        assert_eq!(workflow.outputs.len(), 8);
    }

    #[test]
    fn test_node_layout_for_one_combination() {
        let mut graph = configured_graph();
        expand(&mut graph, &symbolic_campaign()).unwrap();

        let identity = "BM_density_1.0_ym_3.0";
        let input = PathBuf::from("build/bulge").join(identity).join("BM.inp");
        let substitution = graph.node(&input).unwrap();
        assert_eq!(substitution.sources, vec![PathBuf::from("/src/BM.inp.in")]);
        match &substitution.action {
            Action::Substitute {
                substitutions,
                build_subdirectory,
            } => {
                assert_eq!(substitutions.len(), 2);
                assert_eq!(substitutions["density"], "1.0");
                assert_eq!(substitutions["ym"], "3.0");
                assert_eq!(build_subdirectory, &PathBuf::from("build/bulge").join(identity));
            }
            other => panic!("unexpected action {other:?}"),
        }

        let odb = PathBuf::from("build/bulge").join(format!("{}.odb", identity));
        let simulation = graph.node(&odb).unwrap();
        let cae = PathBuf::from("build/bulge").join(format!("{}.cae", identity));
        assert_eq!(
            simulation.sources,
            vec![PathBuf::from(DEFAULT_ENTRY_POINT), cae.clone()]
        );
        match &simulation.action {
            Action::Simulate { options, .. } => assert_eq!(
                options,
                &vec![
                    "--input-file".to_string(),
                    cae.to_string_lossy().to_string(),
                    "--job-name".to_string(),
                    identity.to_string(),
                    "--model-name".to_string(),
                    "BM".to_string(),
                ]
            ),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_alias_covers_whole_workflow() {
        let mut graph = configured_graph();
        let workflow = expand(&mut graph, &symbolic_campaign()).unwrap();

        assert_eq!(workflow.name, "bulge");
        assert_eq!(graph.alias("bulge").unwrap(), workflow.outputs.as_slice());
    }

    #[test]
    fn test_missing_integration_registers_nothing() {
        let mut graph = BuildGraph::new();
        let err = expand(&mut graph, &symbolic_campaign()).unwrap_err();

        assert!(matches!(err, ExpandError::Configuration { .. }));
        assert_eq!(err.to_string(), "'abaqus' program not found in the build environment");
        assert!(graph.nodes().is_empty());
        assert!(graph.alias("bulge").is_none());
    }

    #[test]
    fn test_custom_integration() {
        let campaign = symbolic_campaign().with_integration("calculix");
        let mut graph = configured_graph();
        assert!(expand(&mut graph, &campaign).is_err());

        let mut graph = BuildGraph::new().with_integration("calculix", "ccx");
        assert!(expand(&mut graph, &campaign).is_ok());
    }

    #[test]
    fn test_reexpansion_is_identical() {
        let mut first = configured_graph();
        let mut second = configured_graph();
        expand(&mut first, &symbolic_campaign()).unwrap();
        expand(&mut second, &symbolic_campaign()).unwrap();

        assert_eq!(
            first.manifest().to_json().unwrap(),
            second.manifest().to_json().unwrap()
        );
    }

    #[test]
    fn test_expanding_twice_into_one_graph_is_stable() {
        let mut graph = configured_graph();
        let a = expand(&mut graph, &symbolic_campaign()).unwrap();
        let b = expand(&mut graph, &symbolic_campaign()).unwrap();

        assert_eq!(a, b);
        assert_eq!(graph.nodes().len(), 8);
        assert_eq!(graph.alias("bulge").unwrap().len(), 8);
    }

    #[test]
    fn test_identities_are_distinct() {
        let parameters = ParameterSet::new(vec![
            Axis::new("density", vec![9.5e-9, 1.9e-8, 2.85e-8]),
            Axis::new("ym", vec![40000.0, 80000.0, 120000.0]),
            Axis::new("nu", vec![0.3, 0.45]),
        ])
        .unwrap();
        let campaign = Campaign::new("BM", "BM.inp.in", "build/sweep", parameters);

        let mut graph = configured_graph();
        let workflow = expand(&mut graph, &campaign).unwrap();

        let unique: HashSet<_> = workflow.identities.iter().collect();
        assert_eq!(workflow.identities.len(), 18);
        assert_eq!(unique.len(), 18);
        assert_eq!(graph.nodes().len(), 36);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
model: BM
template: templates/BM.inp.in
build_dir: build/bulge
parameters:
  ym: [40000.0, 80000.0]
  density: [9.5e-9]
"#;
        let campaign =
            Campaign::from_yaml(yaml, Path::new("campaign.yaml"), Path::new("/work")).unwrap();

        assert_eq!(campaign.model, "BM");
        assert_eq!(campaign.template, PathBuf::from("/work/templates/BM.inp.in"));
        assert_eq!(campaign.build_dir, PathBuf::from("/work/build/bulge"));
        assert_eq!(campaign.workflow_name, "bulge");
        assert_eq!(campaign.integration, DEFAULT_INTEGRATION);
        let axes: Vec<_> = campaign
            .parameters
            .axes()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(axes, vec!["ym", "density"]);
    }

    #[test]
    fn test_from_yaml_overrides() {
        let yaml = r#"
model: BM
template: BM.inp.in
workflow_name: bulge-study
entry_point: /opt/tools/submit-job
integration: calculix
parameters:
  ym: [1.0]
"#;
        let campaign =
            Campaign::from_yaml(yaml, Path::new("campaign.yaml"), Path::new("/work")).unwrap();
        assert_eq!(campaign.workflow_name, "bulge-study");
        assert_eq!(campaign.entry_point, PathBuf::from("/opt/tools/submit-job"));
        assert_eq!(campaign.integration, "calculix");
    }

    #[test]
    fn test_from_yaml_rejects_bad_files() {
        let base = Path::new("/work");
        let path = Path::new("campaign.yaml");

        let empty_axis = "model: BM\ntemplate: t.in\nparameters:\n  ym: []\n";
        assert!(matches!(
            Campaign::from_yaml(empty_axis, path, base),
            Err(ExpandError::Invalid { .. })
        ));

        let repeated_value = "model: BM\ntemplate: t.in\nparameters:\n  ym: [1.0, 2.0, 1]\n";
        assert!(matches!(
            Campaign::from_yaml(repeated_value, path, base),
            Err(ExpandError::Invalid { .. })
        ));

        let unknown_key = "model: BM\ntemplate: t.in\nparameters:\n  ym: [1.0]\nextra: 1\n";
        assert!(Campaign::from_yaml(unknown_key, path, base).is_err());

        let blank_model = "model: ' '\ntemplate: t.in\nparameters:\n  ym: [1.0]\n";
        assert!(Campaign::from_yaml(blank_model, path, base).is_err());
    }

    #[test]
    fn test_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("campaign.yaml");
        fs::write(
            &path,
            "model: BM\ntemplate: BM.inp.in\nparameters:\n  ym: [1.0, 2.0]\n",
        )
        .unwrap();

        let campaign = Campaign::from_file(&path).unwrap();
        assert_eq!(campaign.template, temp.path().join("BM.inp.in"));
        assert_eq!(campaign.parameters.len(), 2);

        assert!(matches!(
            Campaign::from_file(&temp.path().join("missing.yaml")),
            Err(ExpandError::Read { .. })
        ));
    }

    #[test]
    fn test_demo_campaign_expands() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/bulge/campaign.yaml");
        let campaign = Campaign::from_file(&path).unwrap();
        assert_eq!(campaign.parameters.len(), 9);

        let mut graph = configured_graph();
        let workflow = expand(&mut graph, &campaign).unwrap();
        assert_eq!(workflow.identities[0], "BM_density_9.5e-9_ym_40000.0");
        assert_eq!(workflow.identities[8], "BM_density_2.85e-8_ym_120000.0");
    }

    #[test]
    fn test_workflow_name_fallback() {
        assert_eq!(workflow_name_for(Path::new("/scratch/bulge")), "bulge");
        assert_eq!(workflow_name_for(Path::new("/")), "workflow");
    }
}
