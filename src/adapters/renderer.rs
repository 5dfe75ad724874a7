//! Preview renderer that shells out to an external command.
//!
//! The generated artifact is piped to the command's stdin; the first
//! non-empty line of stdout is taken as the preview location. The job id is
//! passed in `STAGEGATE_JOB_ID`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{GeneratedArtifact, PreviewArtifact};

use super::{CollaboratorError, PreviewRenderer};

const COLLABORATOR: &str = "preview_renderer";

/// Renderer using subprocess mode
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from a whitespace-separated command line (None if empty)
    pub fn from_command_line(command: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), timeout))
    }

    async fn run(&self, job_id: Uuid, input: &str) -> Result<String, CollaboratorError> {
        let fail = |message: String| CollaboratorError::new(COLLABORATOR, message);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("STAGEGATE_JOB_ID", job_id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| fail(format!("Failed to spawn '{}': {}", self.program, e)))?;

        // Write input to stdin
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| fail(format!("Failed to write to '{}' stdin: {}", self.program, e)))?;
            // Drop stdin to signal EOF
        }

        // Wait for completion with timeout
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| fail(format!("'{}' timed out after {:?}", self.program, self.timeout)))?
            .map_err(|e| fail(format!("Failed to wait for '{}': {}", self.program, e)))?;

        if !output.status.success() {
            // stderr is preserved verbatim
            return Err(fail(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| fail(format!("'{}' output is not valid UTF-8", self.program)))?;

        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| fail(format!("'{}' printed no preview location", self.program)))
    }
}

#[async_trait]
impl PreviewRenderer for CommandRenderer {
    fn name(&self) -> &str {
        "command"
    }

    async fn render(
        &self,
        job_id: Uuid,
        artifact: &GeneratedArtifact,
    ) -> Result<PreviewArtifact, CollaboratorError> {
        let location = self.run(job_id, &artifact.content).await?;
        debug!(%job_id, %location, "Preview rendered");

        Ok(PreviewArtifact {
            renderer: self.program.clone(),
            location,
            metadata: json!({ "generator": artifact.generator }),
        })
    }
}
