use campaign_cli::commands::submit::{self, SubmitArgs};
use campaign_cli::logging;

use clap::Parser;

/// Open a model database and submit a job, tolerating engine-injected arguments
#[derive(Parser, Debug)]
#[command(name = "submit-job", version)]
struct Cli {
    #[command(flatten)]
    args: SubmitArgs,
}

#[tokio::main]
async fn main() {
    logging::init();

    let (known, unknown) = submit::split_known_args(std::env::args_os());
    if !unknown.is_empty() {
        tracing::warn!(arguments = ?unknown, "ignoring unrecognized arguments");
    }

    let cli = Cli::parse_from(known);
    let code = submit::run(cli.args).await;
    std::process::exit(code);
}
