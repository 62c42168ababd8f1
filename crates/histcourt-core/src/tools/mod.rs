//! Court tools, exposed to the agents through adk's [`Tool`](adk_rust::Tool) trait.

mod append_to_state;
mod lookup;
mod write_file;

pub use append_to_state::AppendToStateTool;
pub use lookup::{KnowledgePage, KnowledgeSource, LookupTool, StaticKnowledge, WikipediaSource};
pub use write_file::WriteFileTool;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use adk_rust::{ReadonlyContext, ToolContext};
use serde_json::{Value, json};

use crate::ToolError;
use crate::state::appended;

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("`{key}` must be a string")))
}

pub(crate) fn success() -> Value {
    json!({ "status": "success" })
}

/// Tool response for a failure the model can recover from.
pub(crate) fn soft_failure(err: &ToolError) -> Value {
    json!({ "error": err.to_string() })
}

/// Queue a state write on the event that carries this tool's response.
pub(crate) fn record_state(ctx: &dyn ToolContext, key: &str, value: Value) {
    let mut actions = ctx.actions();
    actions.state_delta.insert(key.to_string(), value);
    ctx.set_actions(actions);
}

/// Sequence values appended through tools, per session and field.
///
/// State deltas only reach the session once the tool event is emitted, so two
/// appends in the same model turn (or from parallel agents) would otherwise
/// read the same snapshot.
#[derive(Debug, Default)]
pub(crate) struct SequenceLedger {
    entries: Mutex<HashMap<(String, String), Vec<String>>>,
}

impl SequenceLedger {
    /// Appends `response` under `field` and returns the whole sequence.
    pub(crate) fn append(&self, ctx: &dyn ToolContext, field: &str, response: &str) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (ctx.session_id().to_string(), field.to_string());
        let items = match entries.remove(&key) {
            Some(mut items) => {
                items.push(response.to_string());
                items
            }
            None => {
                let existing = ctx.session().and_then(|session| session.state().get(field));
                appended(existing, response)
            }
        };
        entries.insert(key, items.clone());
        items
    }
}
