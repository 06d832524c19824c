//! Test invocation.
//!
//! [`CommandInvoker`] runs a test's shell command:
//! - spawns `<shell> -c <command>` in the project (or the test's working dir)
//! - sets `PRESUBMIT_TEST` and the test's extra environment
//! - writes stdout and stderr to `<log dir>/<test>.log`, also on timeout
//! - kills the process if it exceeds its timeout
//!
//! Anything that goes wrong becomes a failed [`TestOutcome`]; invocation
//! never returns an error to the scheduler. A log that cannot be written
//! does not change the test's result.

use crate::config::{TestDefinition, TestsFile};
use crate::dag::{ExecutionTimer, TestOutcome};
use crate::errors::InvokeError;
use crate::settings::PresubmitConfig;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long to keep draining output after the process is gone. Background
/// children of the shell may hold the pipes open.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Runs one test and reports its outcome.
#[async_trait]
pub trait TestInvoker: Send + Sync {
    async fn invoke(&self, test: &str) -> TestOutcome;
}

/// Invoker that runs test commands through a shell.
pub struct CommandInvoker {
    tests: TestsFile,
    project_dir: PathBuf,
    log_dir: Option<PathBuf>,
    log_names: HashMap<String, String>,
    shell: String,
    config: PresubmitConfig,
}

impl CommandInvoker {
    /// Create an invoker for the given test definitions.
    pub fn new(tests: TestsFile, config: PresubmitConfig) -> Self {
        let log_names = assign_log_names(tests.tests.keys().map(String::as_str));
        Self {
            tests,
            project_dir: config.project_dir.clone(),
            log_dir: Some(config.log_dir()),
            log_names,
            shell: config.shell(),
            config,
        }
    }

    /// Disable log capture; output is discarded.
    pub fn without_logs(mut self) -> Self {
        self.log_dir = None;
        self
    }

    /// Path of the captured log for a test.
    pub fn log_path(&self, test: &str) -> Option<PathBuf> {
        let file_name = self
            .log_names
            .get(test)
            .cloned()
            .unwrap_or_else(|| sanitize_file_name(test));
        self.log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.log", file_name)))
    }

    fn working_dir(&self, def: &TestDefinition) -> PathBuf {
        match &def.working_dir {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => self.project_dir.join(p),
            None => self.project_dir.clone(),
        }
    }

    async fn run_command(
        &self,
        test: &str,
        timer: &ExecutionTimer,
    ) -> Result<TestOutcome, InvokeError> {
        let def = self
            .tests
            .test(test)
            .filter(|d| !d.command.trim().is_empty())
            .ok_or_else(|| InvokeError::MissingCommand {
                test: test.to_string(),
            })?;

        let limit = self.config.test_timeout(test, def.timeout_secs);
        let working_dir = self.working_dir(def);

        tracing::debug!(
            test,
            command = %def.command,
            dir = %working_dir.display(),
            timeout_secs = limit.as_secs(),
            "spawning test command"
        );

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&def.command)
            .current_dir(&working_dir)
            .envs(&def.env)
            .env("PRESUBMIT_TEST", test)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InvokeError::SpawnFailed {
                test: test.to_string(),
                source,
            })?;

        let stdout = OutputCapture::start(child.stdout.take());
        let stderr = OutputCapture::start(child.stderr.take());

        let status = match timeout(limit, child.wait()).await {
            Ok(result) => Some(result.map_err(|source| InvokeError::WaitFailed {
                test: test.to_string(),
                source,
            })?),
            Err(_) => {
                tracing::warn!(test, timeout_secs = limit.as_secs(), "test timed out");
                if let Err(e) = child.kill().await {
                    tracing::warn!(test, error = %e, "failed to kill timed-out test");
                }
                None
            }
        };
        let elapsed = timer.elapsed();

        let mut outcome = match status {
            Some(status) => TestOutcome::finished(status.success(), status.code(), elapsed),
            None => {
                let mut outcome =
                    TestOutcome::failure(format!("timed out after {}s", limit.as_secs()), elapsed);
                outcome.timed_out = true;
                outcome
            }
        };

        let output = CapturedOutput {
            stdout: stdout.finish().await,
            stderr: stderr.finish().await,
            status,
            limit,
        };

        if let Some(path) = self.log_path(test) {
            match write_log(&path, &def.command, &output).await {
                Ok(()) => outcome = outcome.with_log(path),
                Err(e) => tracing::warn!(test, error = %e, "test log not written"),
            }
        }

        Ok(outcome)
    }
}

#[async_trait]
impl TestInvoker for CommandInvoker {
    async fn invoke(&self, test: &str) -> TestOutcome {
        let timer = ExecutionTimer::start();
        match self.run_command(test, &timer).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(test, error = %e, "test could not be run");
                TestOutcome::failure(e.to_string(), timer.elapsed())
            }
        }
    }
}

/// Background reader collecting one output stream of a test.
///
/// Bytes land in a shared buffer as they arrive, so whatever was read is
/// still available if the stream never reaches EOF.
struct OutputCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl OutputCapture {
    fn start<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let reader = stream.map(|mut stream| {
            let buf = Arc::clone(&buf);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.lock().await.extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buf, reader }
    }

    async fn finish(self) -> Vec<u8> {
        if let Some(mut reader) = self.reader {
            if timeout(OUTPUT_GRACE, &mut reader).await.is_err() {
                reader.abort();
            }
        }
        std::mem::take(&mut *self.buf.lock().await)
    }
}

struct CapturedOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    /// `None` when the test was killed for exceeding `limit`
    status: Option<ExitStatus>,
    limit: Duration,
}

async fn write_log(path: &Path, command: &str, output: &CapturedOutput) -> Result<(), InvokeError> {
    let log_err = |source: std::io::Error| InvokeError::LogWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(log_err)?;
    }

    let mut content = format!("$ {}\n", command).into_bytes();
    content.extend_from_slice(&output.stdout);
    if !output.stderr.is_empty() {
        content.extend_from_slice(b"\n--- stderr ---\n");
        content.extend_from_slice(&output.stderr);
    }
    let trailer = match output.status {
        Some(status) => format!(
            "\n--- exit: {} ---\n",
            status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string())
        ),
        None => format!("\n--- timed out after {}s ---\n", output.limit.as_secs()),
    };
    content.extend_from_slice(trailer.as_bytes());

    tokio::fs::write(path, content).await.map_err(log_err)
}

/// Make a test name safe to use as a file name.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Give every test a distinct log file name.
///
/// Names that are already file-safe keep their name; the rest are
/// sanitized and suffixed with `-2`, `-3`, ... on collision. Uniqueness is
/// case-insensitive.
fn assign_log_names<'a>(names: impl IntoIterator<Item = &'a str>) -> HashMap<String, String> {
    let (safe, lossy): (Vec<&str>, Vec<&str>) = names
        .into_iter()
        .partition(|name| sanitize_file_name(name) == *name);

    let mut used: HashSet<String> = HashSet::new();
    let mut assigned = HashMap::new();

    for name in safe.into_iter().chain(lossy) {
        let base = sanitize_file_name(name);
        let mut candidate = base.clone();
        let mut n = 2;
        while !used.insert(candidate.to_lowercase()) {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        assigned.insert(name.to_string(), candidate);
    }

    assigned
}
