use crate::CourtError;
use crate::config::Config;
use crate::court::{CourtAgents, CourtSettings, LoopTermination, RoleModels};
use crate::logging::{SessionLogInput, log_session_completion};
use crate::model::model_from_config;
use crate::runtime::CourtRuntime;
use crate::state::{
    COURT_SUMMARY, GREETER_REPLY, PROMPT, TRIAL_TERMINATION, TurnState, USER_INPUT, WRITTEN_FILES,
    into_sequence, render_value,
};
use crate::tasks::{CourtTask, GreeterTask};
use crate::tools::{LookupTool, WriteFileTool};
use crate::trace::{TraceCollector, persist_trace};
use adk_rust::{Llm, Tool};
use anyhow::{Result, anyhow};
use graph_flow::{
    ExecutionStatus, FlowRunner, GraphBuilder, InMemorySessionStorage, Session, SessionStorage,
    Task,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Role models, lookup tool and file writer the court runs against.
#[derive(Clone)]
pub struct CourtResources {
    pub models: RoleModels,
    pub lookup: Arc<dyn Tool>,
    pub writer: Arc<WriteFileTool>,
}

impl CourtResources {
    pub fn new(model: Arc<dyn Llm>, lookup: Arc<dyn Tool>, writer: Arc<WriteFileTool>) -> Self {
        Self {
            models: RoleModels::new(model),
            lookup,
            writer,
        }
    }

    /// Use `model` for the agent named `agent` instead of the shared one.
    pub fn with_role_model(mut self, agent: &str, model: Arc<dyn Llm>) -> Self {
        self.models = self.models.with_role(agent, model);
        self
    }

    /// Gemini model, Wikipedia lookup and a writer rooted at `verdict.root`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let model = model_from_config(config)?;
        let lookup = LookupTool::wikipedia(&config.lookup)?;
        Ok(Self::new(
            model,
            Arc::new(lookup),
            Arc::new(WriteFileTool::new(config.verdict.root.clone())),
        ))
    }
}

/// Source of user messages while the greeter waits for input.
pub trait UserInput: Send {
    /// Receives the greeter's latest reply; returning `None` ends the session.
    fn next_message(&mut self, greeter_reply: Option<&str>) -> Option<String>;
}

/// Replays a fixed list of messages, then ends the session.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    messages: VecDeque<String>,
    replies: Vec<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            messages: messages.into_iter().map(Into::into).collect(),
            replies: Vec::new(),
        }
    }

    /// Greeter replies observed so far.
    pub fn replies(&self) -> &[String] {
        &self.replies
    }
}

impl UserInput for ScriptedInput {
    fn next_message(&mut self, greeter_reply: Option<&str>) -> Option<String> {
        if let Some(reply) = greeter_reply {
            self.replies.push(reply.to_string());
        }
        self.messages.pop_front()
    }
}

fn build_graph(
    runtime: &CourtRuntime,
    writer: Arc<WriteFileTool>,
) -> (Arc<graph_flow::Graph>, Arc<GreeterTask>) {
    let greeter = Arc::new(GreeterTask::new(runtime.clone()));
    let court = Arc::new(CourtTask::new(runtime.clone(), writer));

    let graph = GraphBuilder::new("historical_court")
        .add_task(greeter.clone())
        .add_task(court.clone())
        .add_edge(greeter.id(), court.id())
        .set_start_task(greeter.id())
        .build();

    (Arc::new(graph), greeter)
}

fn new_session_id() -> String {
    format!("court-{}", uuid::Uuid::new_v4())
}

/// Options for running a court session.
pub struct SessionOptions {
    pub session_id: Option<String>,
    pub settings: CourtSettings,
    pub first_message: Option<String>,
    pub initial_state: Vec<(String, Value)>, // Pre-seeded adk session state
    pub trace_dir: Option<PathBuf>,
    pub write_session_log: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            session_id: None,
            settings: CourtSettings::default(),
            first_message: None,
            initial_state: Vec::new(),
            trace_dir: None,
            write_session_log: false,
        }
    }
}

impl SessionOptions {
    pub fn new(settings: CourtSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Seed the first user message so the greeter answers without waiting.
    pub fn with_first_message(mut self, message: impl Into<String>) -> Self {
        self.first_message = Some(message.into());
        self
    }

    pub fn with_initial_state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.initial_state.push((key.into(), value));
        self
    }

    pub fn with_trace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trace_dir = Some(dir.into());
        self
    }

    pub fn with_session_log(mut self, enabled: bool) -> Self {
        self.write_session_log = enabled;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// The verdict writer ran to completion.
    Completed,
    /// The user stopped providing input before a topic was recorded.
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Final state of a court session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: String,
    pub status: SessionStatus,
    pub prompt: Option<String>,
    pub greeting: Option<String>,
    pub summary: Option<String>,
    pub written_files: Vec<String>,
    pub termination: Option<LoopTermination>,
    pub trace: TraceCollector,
    pub trace_path: Option<PathBuf>,
}

/// Run a court session: greet, collect a topic, hold the trial and write the verdict.
pub async fn run_court_session(
    resources: CourtResources,
    options: SessionOptions,
    input: &mut dyn UserInput,
) -> Result<SessionOutcome> {
    let session_id = options.session_id.clone().unwrap_or_else(new_session_id);
    let trace = TraceCollector::new();
    let agents = CourtAgents::build(
        &resources.models,
        resources.lookup,
        resources.writer.clone(),
        &options.settings,
    )?;
    let runtime = CourtRuntime::new(&agents, session_id.clone(), trace.clone())?;
    let initial_state: HashMap<String, Value> = options.initial_state.iter().cloned().collect();
    runtime.open(initial_state).await?;

    let (graph, greeter) = build_graph(&runtime, resources.writer);
    let storage = Arc::new(InMemorySessionStorage::new());
    let runner = FlowRunner::new(graph, storage.clone());

    let session = Session::new_from_task(session_id.clone(), greeter.id());
    if let Some(message) = options.first_message.as_deref() {
        session.context.set(USER_INPUT, message).await;
    }
    storage
        .save(session)
        .await
        .map_err(|err| anyhow!("failed to persist session: {err}"))?;

    info!(%session_id, "court session opened");
    let status = loop {
        let result = runner
            .run(&session_id)
            .await
            .map_err(|err| CourtError::Graph(err.to_string()))?;

        match result.status {
            ExecutionStatus::Completed => break SessionStatus::Completed,
            ExecutionStatus::WaitingForInput => {
                let session = load_session(storage.as_ref(), &session_id).await?;
                let turn = TurnState::from_context(session.context.clone());
                let reply = turn.get_text(GREETER_REPLY).await;
                match input.next_message(reply.as_deref()) {
                    Some(message) => {
                        turn.set_text(USER_INPUT, message).await;
                        storage
                            .save(session)
                            .await
                            .map_err(|err| anyhow!("failed to persist session: {err}"))?;
                    }
                    None => break SessionStatus::Abandoned,
                }
            }
            ExecutionStatus::Error(message) => return Err(CourtError::Graph(message).into()),
        }
    };

    let session = load_session(storage.as_ref(), &session_id).await?;
    let turn = TurnState::from_context(session.context.clone());
    let mut state = runtime.state().await?;
    let termination = state
        .remove(TRIAL_TERMINATION)
        .and_then(|value| serde_json::from_value(value).ok());

    let trace_path = match options.trace_dir.as_ref() {
        Some(dir) => Some(persist_trace(dir, &session_id, &trace.events())?),
        None => None,
    };

    let outcome = SessionOutcome {
        session_id: session_id.clone(),
        status,
        prompt: state
            .remove(PROMPT)
            .filter(|value| !value.is_null())
            .map(|value| render_value(&value)),
        greeting: turn.get_text(GREETER_REPLY).await,
        summary: turn.get_text(COURT_SUMMARY).await,
        written_files: state
            .remove(WRITTEN_FILES)
            .map(into_sequence)
            .unwrap_or_default(),
        termination,
        trace,
        trace_path,
    };

    info!(
        %session_id,
        status = outcome.status.as_str(),
        files = outcome.written_files.len(),
        "court session closed"
    );

    if options.write_session_log {
        if let Err(err) = log_session_completion(session_log_input(&outcome)) {
            warn!(%session_id, error = %err, "failed to write session log");
        }
    }

    Ok(outcome)
}

async fn load_session(storage: &InMemorySessionStorage, session_id: &str) -> Result<Session> {
    storage
        .get(session_id)
        .await
        .map_err(|err| anyhow!("failed to reload session: {err}"))?
        .ok_or_else(|| anyhow!("session {session_id} missing from storage"))
}

fn session_log_input(outcome: &SessionOutcome) -> SessionLogInput {
    SessionLogInput {
        session_id: outcome.session_id.clone(),
        status: outcome.status.as_str().to_string(),
        prompt: outcome.prompt.clone(),
        summary: outcome.summary.clone(),
        termination: outcome.termination.map(|termination| termination.to_string()),
        written_files: outcome.written_files.clone(),
        trace_path: outcome
            .trace_path
            .as_ref()
            .map(|path| path.display().to_string()),
    }
}
