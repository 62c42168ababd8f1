use std::sync::Arc;

use adk_rust::{ReadonlyContext, Tool, ToolContext};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::{SequenceLedger, record_state, required_str, soft_failure, success};

/// Appends a string to a sequence-valued state key.
#[derive(Debug, Default)]
pub struct AppendToStateTool {
    ledger: SequenceLedger,
}

impl AppendToStateTool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Tool for AppendToStateTool {
    fn name(&self) -> &str {
        "append_to_state"
    }

    fn description(&self) -> &str {
        "Append new output to an existing state key."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "field": {
                    "type": "string",
                    "description": "State key to append to."
                },
                "response": {
                    "type": "string",
                    "description": "Text to append."
                }
            },
            "required": ["field", "response"]
        }))
    }

    async fn execute(&self, ctx: Arc<dyn ToolContext>, args: Value) -> adk_rust::Result<Value> {
        let parsed = required_str(&args, "field")
            .and_then(|field| Ok((field, required_str(&args, "response")?)));
        let (field, response) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => return Ok(soft_failure(&err)),
        };

        let entries = self.ledger.append(ctx.as_ref(), field, response);
        info!(
            agent = %ctx.agent_name(),
            field,
            entries = entries.len(),
            "[Added to {field}] {response}"
        );
        record_state(ctx.as_ref(), field, json!(entries));

        Ok(success())
    }
}
