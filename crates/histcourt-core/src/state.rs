//! State keys and value helpers for a court session.
//!
//! Court data (topic, evidence, feedback, written files) lives in the adk
//! session state so agent instructions can template it. The graph-flow
//! [`Context`] only carries the turn-taking values between the greeter and
//! court tasks.

use graph_flow::Context;
use serde::Serialize;
use serde_json::Value;

pub const PROMPT: &str = "PROMPT";
pub const POS_DATA: &str = "pos_data";
pub const NEG_DATA: &str = "neg_data";
pub const CRITICAL_FEEDBACK: &str = "CRITICAL_FEEDBACK";
pub const WRITTEN_FILES: &str = "written_files";
pub const TRIAL_TERMINATION: &str = "trial_termination";

pub const USER_INPUT: &str = "user_input";
pub const GREETER_REPLY: &str = "greeter.reply";
pub const COURT_SUMMARY: &str = "court.summary";

/// Turn-taking values stored on the graph-flow session.
#[derive(Clone)]
pub struct TurnState {
    context: Context,
}

impl TurnState {
    pub fn from_context(context: Context) -> Self {
        Self { context }
    }

    pub async fn get_text(&self, key: &str) -> Option<String> {
        self.context
            .get::<Value>(key)
            .await
            .filter(|value| !value.is_null())
            .map(|value| render_value(&value))
    }

    pub async fn set_text(&self, key: &str, value: impl Serialize) {
        self.context.set(key, value).await;
    }

    pub async fn clear(&self, key: &str) {
        self.context.set(key, Value::Null).await;
    }
}

/// The entries of `existing` followed by `response`.
///
/// An unset value starts a new sequence; a scalar becomes the first entry.
pub fn appended(existing: Option<Value>, response: &str) -> Vec<String> {
    let mut items = existing.map(into_sequence).unwrap_or_default();
    items.push(response.to_string());
    items
}

pub fn into_sequence(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect(),
        Value::Null => Vec::new(),
        Value::String(text) => vec![text],
        other => vec![other.to_string()],
    }
}

/// Strings as-is, string sequences one entry per line, anything else as JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
