use crate::output;

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Args;

use campaign_service::options::DEFAULT_MODEL_NAME;
use campaign_service::{
    load_json_options, EngineConfig, FileEngine, JobSpec, JobSubmitter, SimulationEngine,
    SubmissionOutcome, SubmitError,
};

/// Open a model database and submit the job.
///
/// If the job already exists the model name is ignored and the job options
/// are updated; otherwise the job is created on the model. The engine only
/// ever opens a temporary copy of the input file, so the original keeps its
/// timestamp and content and build tools do not rebuild it on every run.
#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// The model database file with extension, e.g. `input_file.cae`
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input_file: PathBuf,

    /// The name of the job
    #[arg(short = 'j', long, value_name = "NAME")]
    pub job_name: String,

    /// The name of the model
    #[arg(short = 'm', long, value_name = "NAME", default_value = DEFAULT_MODEL_NAME)]
    pub model_name: String,

    /// The number of cpus for the simulation
    #[arg(long, value_name = "N")]
    pub cpus: Option<u32>,

    /// A JSON file containing a mapping of job options
    #[arg(long, value_name = "FILE")]
    pub json_file: Option<PathBuf>,

    /// Engine configuration file (default: ~/.campaign/engine.yaml)
    #[arg(long, value_name = "FILE")]
    pub engine_config: Option<PathBuf>,

    /// Directory for the temporary model copy (default: next to the input file)
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,
}

/// Flags understood by the submitter and whether each takes a value
const KNOWN_FLAGS: &[(&str, bool)] = &[
    ("-i", true),
    ("--input-file", true),
    ("-j", true),
    ("--job-name", true),
    ("-m", true),
    ("--model-name", true),
    ("--cpus", true),
    ("--json-file", true),
    ("--engine-config", true),
    ("--scratch-dir", true),
    ("-h", false),
    ("--help", false),
    ("-V", false),
    ("--version", false),
];

/// Split argv into arguments the submitter understands and everything else.
///
/// The first element (program name) is always kept. Engines forward their
/// own flags to the submitter; anything not in [`KNOWN_FLAGS`] is returned
/// separately instead of failing the parse.
pub fn split_known_args<I, T>(args: I) -> (Vec<OsString>, Vec<OsString>)
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut known: Vec<OsString> = args.next().into_iter().collect();
    let mut unknown = Vec::new();

    while let Some(arg) = args.next() {
        let text = arg.to_string_lossy().to_string();
        let flag = text.split_once('=').map_or(text.as_str(), |(flag, _)| flag);

        match KNOWN_FLAGS.iter().find(|(name, _)| *name == flag) {
            Some((_, takes_value)) => {
                let inline_value = text.contains('=');
                known.push(arg);
                if *takes_value && !inline_value {
                    if let Some(value) = args.next() {
                        known.push(value);
                    }
                }
            }
            None if is_attached_short_value(&text) => known.push(arg),
            None => unknown.push(arg),
        }
    }

    (known, unknown)
}

/// Short value flag with its value attached, e.g. `-ix.cae` or `-jJ1`
fn is_attached_short_value(text: &str) -> bool {
    !text.starts_with("--")
        && text.len() > 2
        && KNOWN_FLAGS
            .iter()
            .any(|(name, takes_value)| *takes_value && name.len() == 2 && text.starts_with(name))
}

/// Build the job spec and run the submission
pub async fn execute(args: SubmitArgs) -> Result<SubmissionOutcome, SubmitError> {
    let config = EngineConfig::load(args.engine_config.as_deref())?;
    let engine = FileEngine::new(config);

    let json_options = match &args.json_file {
        Some(path) => load_json_options(path, engine.constants())?,
        None => Default::default(),
    };

    let spec = JobSpec::new(args.input_file, args.job_name)
        .with_model_name(args.model_name)
        .with_cpus(args.cpus)
        .with_json_options(json_options);

    let mut submitter = JobSubmitter::new(engine);
    if let Some(dir) = args.scratch_dir {
        submitter = submitter.with_scratch_dir(dir);
    }

    submitter.submit(&spec).await
}

/// Run a submission and map the outcome to a process exit code
pub async fn run(args: SubmitArgs) -> i32 {
    output::status("Submitting", &format!("{} from {}", args.job_name, args.input_file.display()));

    match execute(args).await {
        Ok(outcome) => {
            output::success(&format!(
                "Job '{}' completed ({:?})",
                outcome.job_name, outcome.resolution
            ));
            0
        }
        Err(e) => {
            output::submit_error(&e.to_string());
            1
        }
    }
}
