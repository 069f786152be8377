// File-backed Engine
// Model databases stored as JSON documents; jobs run through the configured solver command

use super::{ConstantNamespace, EngineConfig, EngineError, ModelDatabase, SimulationEngine};
use crate::options::JobOptions;

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// On-disk layout of a model database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDocument {
    /// Incremented every time the database is opened
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub jobs: BTreeMap<String, JobRecord>,
}

/// A job stored in a model database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub model: String,
    #[serde(default)]
    pub options: JobOptions,
}

/// Engine operating on JSON model databases
#[derive(Debug, Clone)]
pub struct FileEngine {
    config: EngineConfig,
    constants: ConstantNamespace,
}

impl FileEngine {
    pub fn new(config: EngineConfig) -> Self {
        let mut constants = ConstantNamespace::abaqus();
        constants.extend(config.extra_constants.iter().cloned());
        Self { config, constants }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Default for FileEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[async_trait::async_trait]
impl SimulationEngine for FileEngine {
    async fn open(&self, path: &Path) -> Result<Box<dyn ModelDatabase>, EngineError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| EngineError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut document: DatabaseDocument =
            serde_json::from_str(&content).map_err(|source| EngineError::InvalidDatabase {
                path: path.to_path_buf(),
                source,
            })?;

        // Opening upgrades the file in place, like the real engine does
        document.revision += 1;

        let mut database = FileDatabase {
            path: path.to_path_buf(),
            document,
            config: self.config.clone(),
            running: HashMap::new(),
        };
        database.save().await?;

        tracing::debug!(
            database = %path.display(),
            revision = database.document.revision,
            "opened model database"
        );

        Ok(Box::new(database))
    }

    fn constants(&self) -> &ConstantNamespace {
        &self.constants
    }
}

/// A job started by the solver
struct RunningJob {
    child: Child,
    stderr: JoinHandle<String>,
}

/// An opened JSON model database
pub struct FileDatabase {
    path: PathBuf,
    document: DatabaseDocument,
    config: EngineConfig,
    running: HashMap<String, RunningJob>,
}

impl FileDatabase {
    pub fn document(&self) -> &DatabaseDocument {
        &self.document
    }

    async fn save(&self) -> Result<(), EngineError> {
        let content = serde_json::to_string_pretty(&self.document).map_err(|source| {
            EngineError::InvalidDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|source| EngineError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Render the solver command for a job
    fn render_command(&self, job: &str, record: &JobRecord) -> String {
        let mut command = self
            .config
            .solver_command
            .replace("{job}", &shell_quote(job))
            .replace("{model}", &shell_quote(&record.model))
            .replace("{database}", &shell_quote(&self.path.to_string_lossy()));

        for (key, value) in &record.options {
            command.push(' ');
            command.push_str(&shell_quote(&format!("{}={}", key, value)));
        }

        command
    }
}

#[async_trait::async_trait]
impl ModelDatabase for FileDatabase {
    fn has_job(&self, name: &str) -> bool {
        self.document.jobs.contains_key(name)
    }

    fn has_model(&self, name: &str) -> bool {
        self.document.models.iter().any(|m| m == name)
    }

    async fn update_job(&mut self, name: &str, options: &JobOptions) -> Result<(), EngineError> {
        let record = self
            .document
            .jobs
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownJob(name.to_string()))?;
        record.options.extend(options.clone());
        self.save().await
    }

    async fn create_job(
        &mut self,
        name: &str,
        model: &str,
        options: &JobOptions,
    ) -> Result<(), EngineError> {
        if !self.has_model(model) {
            return Err(EngineError::UnknownModel(model.to_string()));
        }
        self.document.jobs.insert(
            name.to_string(),
            JobRecord {
                model: model.to_string(),
                options: options.clone(),
            },
        );
        self.save().await
    }

    async fn submit(&mut self, name: &str) -> Result<(), EngineError> {
        let record = self
            .document
            .jobs
            .get(name)
            .ok_or_else(|| EngineError::UnknownJob(name.to_string()))?;

        let script = self.render_command(name, record);
        let (shell_cmd, shell_args) = shell_command();
        let work_dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        tracing::info!(job = name, command = %script, "submitting job");

        let mut cmd = Command::new(shell_cmd);
        cmd.args(shell_args);
        cmd.arg(&script);
        cmd.current_dir(work_dir);
        cmd.env("CAMPAIGN_JOB", name);
        cmd.env("CAMPAIGN_MODEL", &record.model);
        cmd.env("CAMPAIGN_DATABASE", &self.path);
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        // Own process group so a timeout can take down everything the shell started
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| EngineError::Spawn {
            job: name.to_string(),
            source,
        })?;

        let stderr = match child.stderr.take() {
            Some(stderr) => tokio::spawn(collect_stderr_tail(stderr)),
            None => tokio::spawn(async { String::new() }),
        };

        self.running
            .insert(name.to_string(), RunningJob { child, stderr });
        Ok(())
    }

    async fn wait_for_completion(&mut self, name: &str) -> Result<(), EngineError> {
        let RunningJob { mut child, stderr } = self
            .running
            .remove(name)
            .ok_or_else(|| EngineError::NotSubmitted(name.to_string()))?;

        let wait_result = if let Some(timeout) = self.config.wait_timeout() {
            match tokio::time::timeout(timeout, child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(job = name, ?timeout, "job timed out, killing solver");
                    kill_process_group(&child).await;
                    let _ = child.kill().await;
                    return Err(EngineError::Timeout {
                        job: name.to_string(),
                        after: timeout,
                    });
                }
            }
        } else {
            child.wait().await
        };

        let status = wait_result.map_err(|source| EngineError::Io {
            path: self.path.clone(),
            source,
        })?;
        let stderr = stderr.await.unwrap_or_default();

        if status.success() {
            tracing::info!(job = name, "job completed");
            Ok(())
        } else {
            Err(EngineError::JobFailed {
                job: name.to_string(),
                code: status.code(),
                stderr,
            })
        }
    }
}

/// Lines of solver stderr kept for error reports
const STDERR_TAIL_LINES: usize = 200;

/// Read solver stderr to the end, keeping only the last [`STDERR_TAIL_LINES`] lines
async fn collect_stderr_tail<R>(stderr: R) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

/// Send SIGKILL to the solver's process group
#[cfg(unix)]
async fn kill_process_group(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let group = format!("-{}", pid);
    let status = Command::new("kill")
        .args(["-KILL", "--", group.as_str()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = status {
        tracing::warn!(pid, error = %e, "failed to kill solver process group");
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_child: &Child) {}

/// Shell executable and arguments for running the solver command
fn shell_command() -> (&'static str, &'static [&'static str]) {
    if cfg!(target_os = "windows") {
        ("cmd", &["/C"])
    } else {
        ("sh", &["-c"])
    }
}

/// Quote a word for `sh` unless it is plainly safe
fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.,:/=+@%".contains(c));
    if safe || cfg!(target_os = "windows") {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::options::OptionValue;

    use std::fs;
    use std::time::Duration;

    fn write_database(dir: &Path, document: &DatabaseDocument) -> PathBuf {
        let path = dir.join("model.cae");
        fs::write(&path, serde_json::to_string_pretty(document).unwrap()).unwrap();
        path
    }

    fn bulge_document() -> DatabaseDocument {
        let mut jobs = BTreeMap::new();
        jobs.insert(
            "Existing".to_string(),
            JobRecord {
                model: "BM".to_string(),
                options: JobOptions::new(),
            },
        );
        DatabaseDocument {
            revision: 0,
            models: vec!["BM".to_string()],
            jobs,
        }
    }

    fn engine_with(command: &str) -> FileEngine {
        FileEngine::new(EngineConfig {
            solver_command: command.to_string(),
            ..Default::default()
        })
    }

    fn read_document(path: &Path) -> DatabaseDocument {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_open_rewrites_database() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_database(temp.path(), &bulge_document());

        let engine = engine_with("true");
        let db = engine.open(&path).await.unwrap();
        assert!(db.has_job("Existing"));
        assert!(db.has_model("BM"));
        assert!(!db.has_model("Other"));

        assert_eq!(read_document(&path).revision, 1);
    }

    #[tokio::test]
    async fn test_open_invalid_database() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("broken.cae");
        fs::write(&path, "not a database").unwrap();

        let result = engine_with("true").open(&path).await;
        assert!(matches!(result, Err(EngineError::InvalidDatabase { .. })));
    }

    #[tokio::test]
    async fn test_create_and_run_job() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_database(temp.path(), &bulge_document());

        let engine = engine_with(r#"test "$CAMPAIGN_JOB" = {job} && test "$CAMPAIGN_MODEL" = BM && true"#);
        let mut db = engine.open(&path).await.unwrap();

        let mut options = JobOptions::new();
        options.insert("numCpus".to_string(), OptionValue::Integer(2));
        db.create_job("J1", "BM", &options).await.unwrap();
        db.submit("J1").await.unwrap();
        db.wait_for_completion("J1").await.unwrap();

        let document = read_document(&path);
        assert_eq!(document.jobs["J1"].model, "BM");
        assert_eq!(document.jobs["J1"].options["numCpus"], OptionValue::Integer(2));
    }

    #[tokio::test]
    async fn test_create_job_unknown_model() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_database(temp.path(), &bulge_document());

        let mut db = engine_with("true").open(&path).await.unwrap();
        let result = db.create_job("J1", "Missing", &JobOptions::new()).await;
        assert!(matches!(result, Err(EngineError::UnknownModel(_))));
    }

    #[tokio::test]
    async fn test_update_merges_options() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_database(temp.path(), &bulge_document());

        let mut db = engine_with("true").open(&path).await.unwrap();
        let mut options = JobOptions::new();
        options.insert("memory".to_string(), OptionValue::Integer(75));
        db.update_job("Existing", &options).await.unwrap();

        assert_eq!(
            read_document(&path).jobs["Existing"].options["memory"],
            OptionValue::Integer(75)
        );
        assert!(matches!(
            db.update_job("Nope", &options).await,
            Err(EngineError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_options_are_appended_as_arguments() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_database(temp.path(), &bulge_document());

        // The options land in "$@" of the inner script
        let engine = engine_with(r#"sh -c 'test "$1" = memory=50' solver"#);
        let mut db = engine.open(&path).await.unwrap();
        let mut options = JobOptions::new();
        options.insert("memory".to_string(), OptionValue::Integer(50));
        db.update_job("Existing", &options).await.unwrap();
        db.submit("Existing").await.unwrap();
        db.wait_for_completion("Existing").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_job_reports_stderr() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_database(temp.path(), &bulge_document());

        let mut db = engine_with("echo 'solver exploded' >&2; exit 3")
            .open(&path)
            .await
            .unwrap();
        db.submit("Existing").await.unwrap();
        let err = db.wait_for_completion("Existing").await.unwrap_err();

        match err {
            EngineError::JobFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("solver exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_wait_without_submit() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_database(temp.path(), &bulge_document());

        let mut db = engine_with("true").open(&path).await.unwrap();
        assert!(matches!(
            db.wait_for_completion("Existing").await,
            Err(EngineError::NotSubmitted(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_timeout_kills_job() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_database(temp.path(), &bulge_document());

        let engine = FileEngine::new(EngineConfig {
            solver_command: "sleep 30".to_string(),
            wait_timeout_secs: Some(1),
            ..Default::default()
        });
        let mut db = engine.open(&path).await.unwrap();
        db.submit("Existing").await.unwrap();

        match db.wait_for_completion("Existing").await {
            Err(EngineError::Timeout { after, .. }) => {
                assert_eq!(after, Duration::from_secs(1))
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_background_processes() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_database(temp.path(), &bulge_document());
        let pid_file = temp.path().join("background.pid");

        let engine = FileEngine::new(EngineConfig {
            solver_command: "sleep 30 & echo $! > background.pid; wait".to_string(),
            wait_timeout_secs: Some(1),
            ..Default::default()
        });
        let mut db = engine.open(&path).await.unwrap();
        db.submit("Existing").await.unwrap();
        assert!(matches!(
            db.wait_for_completion("Existing").await,
            Err(EngineError::Timeout { .. })
        ));

        let pid = fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let stat_path = PathBuf::from(format!("/proc/{}/stat", pid));
        let mut gone = false;
        for _ in 0..50 {
            // Exited or a zombie waiting to be reaped
            match fs::read_to_string(&stat_path) {
                Err(_) => gone = true,
                Ok(stat) => gone = stat.contains(") Z"),
            }
            if gone {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(gone, "background solver process {pid} survived the timeout");
    }

    #[tokio::test]
    async fn test_stderr_keeps_only_the_tail() {
        let text: String = (0..STDERR_TAIL_LINES + 50)
            .map(|i| format!("line {i}\n"))
            .collect();
        let tail = collect_stderr_tail(text.as_bytes()).await;

        let lines: Vec<_> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines[0], "line 50");
        assert_eq!(
            lines.last().copied(),
            Some(format!("line {}", STDERR_TAIL_LINES + 49).as_str())
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("BM_density_1.0"), "BM_density_1.0");
        assert_eq!(shell_quote("numCpus=4"), "numCpus=4");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_extra_constants() {
        let engine = FileEngine::new(EngineConfig {
            extra_constants: vec!["EXPLICIT".to_string()],
            ..Default::default()
        });
        assert!(engine.constants().contains("EXPLICIT"));
        assert!(engine.constants().contains("ANALYSIS"));
    }
}
