use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::bail;
use color_eyre::Result;
use indexmap::IndexMap;

use campaign_service::apply_substitution;

/// Render one template with concrete parameter values
#[derive(Args, Debug)]
pub struct SubstituteArgs {
    /// Template containing `@name@` placeholders
    #[arg(long, value_name = "FILE")]
    pub template: PathBuf,

    /// File to write
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: PathBuf,

    /// Set a placeholder value (can be repeated, format: name=value)
    #[arg(long = "set", short = 's', value_name = "NAME=VALUE")]
    pub values: Vec<String>,
}

pub fn execute(args: SubstituteArgs) -> Result<()> {
    let mut substitutions = IndexMap::new();
    for pair in &args.values {
        match pair.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                substitutions.insert(name.to_string(), value.to_string());
            }
            _ => bail!("Invalid value format '{}'. Expected name=value", pair),
        }
    }

    output::status("Rendering", &format!("{}", args.template.display()));
    let rendered = apply_substitution(&args.template, &args.output, &substitutions)?;

    for key in &rendered.unused_keys {
        output::warning(&format!("'{}' does not appear in the template", key));
    }
    output::success(&format!("Wrote {}", args.output.display()));

    Ok(())
}
