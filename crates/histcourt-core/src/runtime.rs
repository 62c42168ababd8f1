//! adk runners and session store behind one court session.
//!
//! The greeter and the court run as separate runner roots over the same adk
//! session, so the court sees the topic and the conversation that led to it.

use std::collections::HashMap;
use std::sync::Arc;

use adk_rust::futures::StreamExt;
use adk_rust::runner::Runner;
use adk_rust::session::{CreateRequest, GetRequest, InMemorySessionService, SessionService};
use adk_rust::{Agent, Content, Event, Part, RunConfig, StreamingMode};
use serde_json::Value;
use tracing::debug;

use crate::court::CourtAgents;
use crate::trace::TraceCollector;
use crate::{CourtError, metrics};

pub const APP_NAME: &str = "histcourt";
pub const USER_ID: &str = "user";

#[derive(Clone)]
pub struct CourtRuntime {
    sessions: Arc<InMemorySessionService>,
    greeter: Arc<Runner>,
    court: Arc<Runner>,
    session_id: String,
    trace: TraceCollector,
}

impl CourtRuntime {
    pub fn new(
        agents: &CourtAgents,
        session_id: impl Into<String>,
        trace: TraceCollector,
    ) -> Result<Self, CourtError> {
        let sessions = Arc::new(InMemorySessionService::new());
        let greeter = runner(agents.greeter.clone(), &sessions)?;
        let court = runner(agents.court.clone(), &sessions)?;
        Ok(Self {
            sessions,
            greeter: Arc::new(greeter),
            court: Arc::new(court),
            session_id: session_id.into(),
            trace,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn trace(&self) -> &TraceCollector {
        &self.trace
    }

    /// Create the adk session, seeded with `state`.
    pub async fn open(&self, state: HashMap<String, Value>) -> Result<(), CourtError> {
        self.sessions
            .create(CreateRequest {
                app_name: APP_NAME.to_string(),
                user_id: USER_ID.to_string(),
                session_id: Some(self.session_id.clone()),
                state,
            })
            .await?;
        Ok(())
    }

    /// Send a user message to the greeter and return its final reply.
    pub async fn ask_greeter(&self, message: &str) -> Result<Option<String>, CourtError> {
        self.trace.record("user", message);
        self.run_turn(&self.greeter, message).await
    }

    /// Run the trial and verdict on `topic` and return the court's closing text.
    pub async fn hold_trial(&self, topic: &str) -> Result<Option<String>, CourtError> {
        let message = format!("Put {topic} on trial.");
        self.run_turn(&self.court, &message).await
    }

    /// Current adk session state.
    pub async fn state(&self) -> Result<HashMap<String, Value>, CourtError> {
        let session = self
            .sessions
            .get(GetRequest {
                app_name: APP_NAME.to_string(),
                user_id: USER_ID.to_string(),
                session_id: self.session_id.clone(),
                num_recent_events: None,
                after: None,
            })
            .await?;
        Ok(session.state().all())
    }

    pub async fn value(&self, key: &str) -> Result<Option<Value>, CourtError> {
        let mut state = self.state().await?;
        Ok(state.remove(key).filter(|value| !value.is_null()))
    }

    async fn run_turn(&self, runner: &Runner, message: &str) -> Result<Option<String>, CourtError> {
        let content = Content::new("user").with_text(message);
        let mut events = runner.run_str(USER_ID, &self.session_id, content).await?;

        let mut reply = None;
        while let Some(event) = events.next().await {
            let event = event?;
            self.observe(&event);
            if let Some(text) = final_text(&event) {
                reply = Some(text);
            }
        }
        Ok(reply)
    }

    fn observe(&self, event: &Event) {
        let Some(content) = event.llm_response.content.as_ref() else {
            return;
        };
        if event.llm_response.partial || event.author == "user" {
            return;
        }
        let author = event.author.as_str();
        if content.role == "model" {
            metrics::record_model_call(author);
        }

        for part in &content.parts {
            match part {
                Part::Text { text } if !text.trim().is_empty() => {
                    self.trace.record(author, text.as_str())
                }
                Part::FunctionCall { name, args, .. } => {
                    metrics::record_tool_call(author, name);
                    self.trace.record(author, format!("called {name} {args}"));
                }
                _ => {}
            }
        }
        debug!(author, id = %event.id, "event observed");
    }
}

fn runner(
    agent: Arc<dyn Agent>,
    sessions: &Arc<InMemorySessionService>,
) -> Result<Runner, CourtError> {
    let runner = Runner::builder()
        .app_name(APP_NAME)
        .agent(agent)
        .session_service(sessions.clone())
        .run_config(
            RunConfig::builder()
                .streaming_mode(StreamingMode::None)
                .build(),
        )
        .build()?;
    Ok(runner)
}

/// Text of a final, non-empty agent response.
fn final_text(event: &Event) -> Option<String> {
    if !event.is_final_response() {
        return None;
    }
    let text = event
        .llm_response
        .content
        .as_ref()?
        .parts
        .iter()
        .filter_map(Part::text)
        .collect::<Vec<_>>()
        .join("");
    (!text.trim().is_empty()).then_some(text)
}
