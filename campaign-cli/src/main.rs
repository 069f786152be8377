use campaign_cli::commands::{expand, submit, substitute};
use campaign_cli::logging;

use clap::{Parser, Subcommand};
use color_eyre::Result;

/// Expand parametric simulation campaigns and submit their jobs
#[derive(Parser, Debug)]
#[command(name = "campaign", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a campaign's build nodes and write the graph manifest
    Expand(expand::ExpandArgs),

    /// Render one template with concrete parameter values
    Substitute(substitute::SubstituteArgs),

    /// Submit one job (same as the `submit-job` executable, strict arguments)
    Submit(submit::SubmitArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Expand(args) => expand::execute(args),
        Command::Substitute(args) => substitute::execute(args),
        Command::Submit(args) => {
            let code = submit::run(args).await;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
    }
}
