// Job Submission
// Opens a disposable copy of a model database, resolves the job, submits it, and waits

use crate::engine::{EngineError, ModelDatabase, SimulationEngine};
use crate::options::{JobOptions, JobSpec};

use thiserror::Error;

use std::io;
use std::path::{Path, PathBuf};

/// Errors that end a submission
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Could not find model name '{model}' in file '{file}'")]
    Resolution { model: String, file: PathBuf },

    #[error("failed to create a working copy of '{path}': {source}")]
    Copy { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Options(#[from] crate::options::OptionsError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// How the requested job is addressed in the opened database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Job exists; its options are updated and the model name is ignored
    Update,
    /// Job is missing but the model exists; a new job is created on it
    Create,
    /// Neither the job nor the model exists
    Unresolved,
}

impl Resolution {
    /// Three-way decision over the two presence checks; an existing job wins
    pub fn resolve(has_job: bool, has_model: bool) -> Self {
        match (has_job, has_model) {
            (true, _) => Resolution::Update,
            (false, true) => Resolution::Create,
            (false, false) => Resolution::Unresolved,
        }
    }
}

/// Result of a completed submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub job_name: String,
    pub resolution: Resolution,
    pub options: JobOptions,
}

/// Submits jobs through a simulation engine without touching the caller's file
pub struct JobSubmitter<E: SimulationEngine> {
    engine: E,
    /// Directory for disposable copies (default: next to the input file)
    scratch_dir: Option<PathBuf>,
}

impl<E: SimulationEngine> JobSubmitter<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            scratch_dir: None,
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run one submission to completion.
    ///
    /// The engine only ever sees a randomly named copy of `spec.input_file`;
    /// the copy is removed on every exit path when it goes out of scope.
    pub async fn submit(&self, spec: &JobSpec) -> Result<SubmissionOutcome, SubmitError> {
        let copy = self.disposable_copy(&spec.input_file)?;
        tracing::debug!(
            input = %spec.input_file.display(),
            copy = %copy.path().display(),
            "created working copy"
        );

        let mut database = self.engine.open(copy.path()).await?;
        let resolution = Resolution::resolve(
            database.has_job(&spec.job_name),
            database.has_model(&spec.model_name),
        );
        let options = spec.options();

        apply(database.as_mut(), spec, resolution, &options).await?;

        tracing::info!(job = %spec.job_name, ?resolution, "submitting");
        database.submit(&spec.job_name).await?;
        database.wait_for_completion(&spec.job_name).await?;

        drop(database);
        copy.close().map_err(|source| SubmitError::Copy {
            path: spec.input_file.clone(),
            source,
        })?;

        Ok(SubmissionOutcome {
            job_name: spec.job_name.clone(),
            resolution,
            options,
        })
    }

    fn disposable_copy(&self, input: &Path) -> Result<tempfile::NamedTempFile, SubmitError> {
        let copy_err = |source| SubmitError::Copy {
            path: input.to_path_buf(),
            source,
        };

        let dir = match &self.scratch_dir {
            Some(dir) => dir.clone(),
            None => input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        let suffix = input
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let copy = tempfile::Builder::new()
            .prefix(".submit-")
            .suffix(&suffix)
            .tempfile_in(&dir)
            .map_err(copy_err)?;
        std::fs::copy(input, copy.path()).map_err(copy_err)?;
        Ok(copy)
    }
}

/// Apply the resolved transition to the opened database
async fn apply(
    database: &mut dyn ModelDatabase,
    spec: &JobSpec,
    resolution: Resolution,
    options: &JobOptions,
) -> Result<(), SubmitError> {
    match resolution {
        Resolution::Update => {
            database.update_job(&spec.job_name, options).await?;
        }
        Resolution::Create => {
            database
                .create_job(&spec.job_name, &spec.model_name, options)
                .await?;
        }
        Resolution::Unresolved => {
            return Err(SubmitError::Resolution {
                model: spec.model_name.clone(),
                file: spec.input_file.clone(),
            });
        }
    }
    Ok(())
}
