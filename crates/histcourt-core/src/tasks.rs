use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};
use tracing::{debug, info, instrument};

use crate::CourtError;
use crate::court::{COURT, GREETER, VERDICT_WRITER};
use crate::runtime::CourtRuntime;
use crate::state::{COURT_SUMMARY, GREETER_REPLY, PROMPT, TurnState, USER_INPUT, render_value};
use crate::tools::WriteFileTool;

fn task_failure(err: CourtError) -> GraphError {
    GraphError::TaskExecutionFailed(err.to_string())
}

/// Runs the greeter on each pending user message until a topic is stored in `PROMPT`.
pub struct GreeterTask {
    runtime: CourtRuntime,
}

impl GreeterTask {
    pub fn new(runtime: CourtRuntime) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl Task for GreeterTask {
    fn id(&self) -> &str {
        GREETER
    }

    #[instrument(name = "task.greeter", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let turn = TurnState::from_context(context);

        let Some(message) = turn.get_text(USER_INPUT).await else {
            debug!("no pending user message");
            return Ok(TaskResult::new(None, NextAction::WaitForInput));
        };
        turn.clear(USER_INPUT).await;

        let reply = self
            .runtime
            .ask_greeter(&message)
            .await
            .map_err(task_failure)?
            .unwrap_or_default();
        turn.set_text(GREETER_REPLY, &reply).await;

        let topic = self.runtime.value(PROMPT).await.map_err(task_failure)?;
        if topic.is_some() {
            info!("topic recorded, handing over to the court");
            Ok(TaskResult::new(Some(reply), NextAction::ContinueAndExecute))
        } else {
            Ok(TaskResult::new(Some(reply), NextAction::WaitForInput))
        }
    }
}

/// Runs the court pipeline (trial loop, then verdict writer) on the recorded topic.
pub struct CourtTask {
    runtime: CourtRuntime,
    writer: Arc<WriteFileTool>,
}

impl CourtTask {
    pub fn new(runtime: CourtRuntime, writer: Arc<WriteFileTool>) -> Self {
        Self { runtime, writer }
    }
}

#[async_trait]
impl Task for CourtTask {
    fn id(&self) -> &str {
        COURT
    }

    #[instrument(name = "task.court", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let turn = TurnState::from_context(context);
        let runtime = &self.runtime;
        let topic = runtime
            .value(PROMPT)
            .await
            .map_err(task_failure)?
            .map(|value| render_value(&value))
            .unwrap_or_default();
        info!(%topic, "court in session");

        let closing = runtime.hold_trial(&topic).await.map_err(task_failure)?;

        if let Some(source) = self.writer.take_failure(runtime.session_id()) {
            return Err(task_failure(CourtError::Tool {
                agent: VERDICT_WRITER.to_string(),
                tool: "write_file".to_string(),
                source,
            }));
        }

        let summary = closing
            .unwrap_or_else(|| "The court adjourned without a closing statement.".to_string());
        turn.set_text(COURT_SUMMARY, &summary).await;

        Ok(TaskResult::new(Some(summary), NextAction::End))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LookupConfig;
    use crate::court::{CourtAgents, CourtSettings, RoleModels};
    use crate::tools::{LookupTool, StaticKnowledge};
    use crate::trace::TraceCollector;
    use adk_rust::model::MockLlm;
    use adk_rust::{Content, LlmResponse};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    fn runtime(model: MockLlm) -> CourtRuntime {
        let lookup = Arc::new(LookupTool::new(
            Arc::new(StaticKnowledge::new()),
            &LookupConfig::default(),
        ));
        let agents = CourtAgents::build(
            &RoleModels::new(Arc::new(model)),
            lookup,
            Arc::new(WriteFileTool::default()),
            &CourtSettings::default(),
        )
        .unwrap();
        CourtRuntime::new(&agents, "test-session", TraceCollector::new()).unwrap()
    }

    fn replying(text: &str) -> MockLlm {
        MockLlm::new("greeter")
            .with_response(LlmResponse::new(Content::new("model").with_text(text)))
    }

    #[tokio::test]
    async fn greeter_waits_without_running_when_no_message_is_pending() {
        // The adk session is never opened, so running the greeter would fail.
        let task = GreeterTask::new(runtime(MockLlm::new("silent")));
        let context = Context::new();

        let result = task.run(context.clone()).await.unwrap();

        assert_eq!(result.next_action, NextAction::WaitForInput);
        let turn = TurnState::from_context(context);
        assert!(turn.get_text(GREETER_REPLY).await.is_none());
    }

    #[tokio::test]
    async fn greeter_consumes_the_pending_message() {
        let runtime = runtime(replying("Which figure shall we try?"));
        runtime.open(HashMap::new()).await.unwrap();
        let context = Context::new();
        context.set(USER_INPUT, "Hello").await;

        let task = GreeterTask::new(runtime);
        let result = task.run(context.clone()).await.unwrap();

        let turn = TurnState::from_context(context);
        assert_eq!(result.next_action, NextAction::WaitForInput);
        assert!(turn.get_text(USER_INPUT).await.is_none());
        assert_eq!(
            turn.get_text(GREETER_REPLY).await.as_deref(),
            Some("Which figure shall we try?")
        );
    }

    #[tokio::test]
    async fn greeter_hands_over_once_a_topic_is_stored() {
        let runtime = runtime(replying("The investigation begins."));
        let state: HashMap<String, Value> = [(PROMPT.to_string(), json!(["Napoleon"]))].into();
        runtime.open(state).await.unwrap();
        let context = Context::new();
        context.set(USER_INPUT, "Napoleon").await;

        let task = GreeterTask::new(runtime);
        let result = task.run(context).await.unwrap();

        assert_eq!(result.next_action, NextAction::ContinueAndExecute);
        assert_eq!(
            result.response.as_deref(),
            Some("The investigation begins.")
        );
    }
}
