use crate::core::error::TaskError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

const OUTPUT_CAPTURE_LIMIT_BYTES: usize = 1_048_576;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandRequest {
    pub fn new<I, S>(program: impl Into<String>, args: I, cwd: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: cwd.into(),
        }
    }

    /// Command line for logs and error context.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external programs for task bodies (e.g. `git`).
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, TaskError>;
}

/// Spawns the program directly (no shell) and captures both streams.
#[derive(Debug, Default, Clone)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, TaskError> {
        tracing::debug!(cmd = %request.display(), cwd = %request.cwd.display(), "executing command");

        let output = Command::new(&request.program)
            .args(&request.args)
            .current_dir(&request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| {
                TaskError::new(format!("failed to execute {}: {}", request.program, err))
                    .with_code("CMD-002")
                    .with_context("cwd", request.cwd.display().to_string())
            })?;

        Ok(CommandOutput {
            stdout: limit_bytes(&output.stdout),
            stderr: limit_bytes(&output.stderr),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Run a command and turn a non-zero exit into a `TaskError`.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    request: &CommandRequest,
) -> Result<CommandOutput, TaskError> {
    let output = runner.run(request).await?;
    if !output.success() {
        return Err(TaskError::new(format!(
            "`{}` failed with exit code {}",
            request.display(),
            output.exit_code
        ))
        .with_code("CMD-001")
        .with_context("cwd", request.cwd.display().to_string())
        .with_context("stderr", output.stderr.trim().to_string()));
    }
    Ok(output)
}

fn limit_bytes(bytes: &[u8]) -> String {
    let limit = OUTPUT_CAPTURE_LIMIT_BYTES.min(bytes.len());
    String::from_utf8_lossy(&bytes[..limit]).into_owned()
}
