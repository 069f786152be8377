use crate::output;

use std::fs;
use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;

use campaign_service::{expand, BuildGraph, Campaign};

/// Register a campaign's build nodes and write the graph manifest
#[derive(Args, Debug)]
pub struct ExpandArgs {
    /// Path to the campaign YAML file
    pub campaign: PathBuf,

    /// Where to write the graph manifest (default: <build_dir>/graph.json)
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Program path for the campaign's integration instead of searching PATH
    #[arg(long, value_name = "PATH")]
    pub integration_path: Option<PathBuf>,

    /// List every simulation identity after expansion
    #[arg(long)]
    pub list: bool,
}

pub fn execute(args: ExpandArgs) -> Result<()> {
    if !args.campaign.exists() {
        bail!("Campaign file not found: {}", args.campaign.display());
    }

    output::status("Expanding", &format!("{}", args.campaign.display()));
    let campaign = Campaign::from_file(&args.campaign)?;

    let mut graph = match &args.integration_path {
        Some(program) => BuildGraph::new().with_integration(&campaign.integration, program),
        None => {
            let mut graph = BuildGraph::new();
            if !graph.detect_integration(&campaign.integration) {
                output::warning(&format!(
                    "'{}' was not found on PATH",
                    campaign.integration
                ));
            }
            graph
        }
    };

    let workflow = expand(&mut graph, &campaign)?;

    if args.list {
        for identity in &workflow.identities {
            output::dim(&format!("  {}", identity));
        }
    }

    let manifest_path = args
        .output
        .unwrap_or_else(|| campaign.build_dir.join("graph.json"));
    if let Some(parent) = manifest_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = graph.manifest().to_json()?;
    fs::write(&manifest_path, json)
        .wrap_err_with(|| format!("Failed to write {}", manifest_path.display()))?;

    output::success(&format!(
        "Workflow '{}': {} simulations, {} nodes -> {}",
        workflow.name,
        workflow.identities.len(),
        graph.nodes().len(),
        manifest_path.display()
    ));

    Ok(())
}
