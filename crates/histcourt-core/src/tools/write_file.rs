use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use adk_rust::{AdkError, ReadonlyContext, Tool, ToolContext};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{SequenceLedger, record_state, required_str, soft_failure};
use crate::ToolError;
use crate::state::WRITTEN_FILES;

/// Writes text content to `<root>/<directory>/<filename>`, creating directories as needed.
///
/// Filesystem failures are kept per session so the caller can fail the
/// session with [`WriteFileTool::take_failure`] once the agent run ends.
#[derive(Debug)]
pub struct WriteFileTool {
    root: PathBuf,
    written: SequenceLedger,
    failures: Mutex<HashMap<String, ToolError>>,
}

impl WriteFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: SequenceLedger::default(),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn target(&self, directory: &str, filename: &str) -> PathBuf {
        self.root.join(directory).join(filename)
    }

    /// First filesystem failure recorded for `session_id`, if any.
    pub fn take_failure(&self, session_id: &str) -> Option<ToolError> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }

    async fn write(
        &self,
        directory: &str,
        filename: &str,
        content: &str,
    ) -> Result<PathBuf, ToolError> {
        let target = self.target(directory, filename);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| ToolError::io(parent.to_path_buf(), err))?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|err| ToolError::io(target.clone(), err))?;
        Ok(target)
    }
}

impl Default for WriteFileTool {
    fn default() -> Self {
        Self::new(".")
    }
}

fn arguments(args: &Value) -> Result<(&str, &str, &str), ToolError> {
    Ok((
        required_str(args, "directory")?,
        required_str(args, "filename")?,
        required_str(args, "content")?,
    ))
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "Directory to write into."
                },
                "filename": {
                    "type": "string",
                    "description": "Name of the file, including extension."
                },
                "content": {
                    "type": "string",
                    "description": "Full text content of the file."
                }
            },
            "required": ["directory", "filename", "content"]
        }))
    }

    async fn execute(&self, ctx: Arc<dyn ToolContext>, args: Value) -> adk_rust::Result<Value> {
        let (directory, filename, content) = match arguments(&args) {
            Ok(parsed) => parsed,
            Err(err) => return Ok(soft_failure(&err)),
        };

        let target = match self.write(directory, filename, content).await {
            Ok(target) => target,
            Err(err) => {
                warn!(agent = %ctx.agent_name(), error = %err, "verdict write failed");
                let message = format!("write_file: {err}");
                self.failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(ctx.session_id().to_string())
                    .or_insert(err);
                return Err(AdkError::tool(message));
            }
        };

        let written = target.display().to_string();
        info!(agent = %ctx.agent_name(), bytes = content.len(), "File written to {written}");
        let files = self.written.append(ctx.as_ref(), WRITTEN_FILES, &written);
        record_state(ctx.as_ref(), WRITTEN_FILES, json!(files));

        Ok(json!({ "status": "success", "path": written }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adk_rust::tool::SimpleToolContext;
    use tempfile::TempDir;

    fn context() -> Arc<SimpleToolContext> {
        Arc::new(SimpleToolContext::new("verdict_writer").with_session_id("court-test"))
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let temp = TempDir::new().unwrap();
        let tool = WriteFileTool::new(temp.path());
        let ctx = context();

        tool.execute(
            ctx.clone(),
            json!({
                "directory": "verdicts/nested",
                "filename": "napoleon.txt",
                "content": "report",
            }),
        )
        .await
        .unwrap();

        let target = temp.path().join("verdicts/nested/napoleon.txt");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "report");
        assert_eq!(
            ctx.actions().state_delta[WRITTEN_FILES],
            json!([target.display().to_string()])
        );
    }

    #[tokio::test]
    async fn second_write_overwrites() {
        let temp = TempDir::new().unwrap();
        let tool = WriteFileTool::new(temp.path());

        for content in ["a much longer first draft", "final"] {
            tool.execute(
                context(),
                json!({"directory": "verdicts", "filename": "x.txt", "content": content}),
            )
            .await
            .unwrap();
        }

        let stored = std::fs::read_to_string(temp.path().join("verdicts/x.txt")).unwrap();
        assert_eq!(stored, "final");
    }

    #[tokio::test]
    async fn filesystem_errors_are_kept_for_the_session() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("blocker"), "file, not a directory").unwrap();
        let tool = WriteFileTool::new(temp.path());

        let err = tool
            .execute(
                context(),
                json!({"directory": "blocker", "filename": "x.txt", "content": "c"}),
            )
            .await
            .unwrap_err();
        assert!(
            err.to_string().contains("write_file"),
            "unexpected error: {err}"
        );

        let failure = tool.take_failure("court-test").expect("failure recorded");
        assert!(!failure.is_recoverable());
        assert!(tool.take_failure("court-test").is_none());
    }

    #[tokio::test]
    async fn missing_content_goes_back_to_the_model() {
        let temp = TempDir::new().unwrap();
        let tool = WriteFileTool::new(temp.path());

        let result = tool
            .execute(context(), json!({"directory": "verdicts", "filename": "x.txt"}))
            .await
            .unwrap();

        assert_eq!(
            result["error"],
            "invalid arguments: `content` must be a string"
        );
        assert!(tool.take_failure("court-test").is_none());
    }
}
