#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use adk_rust::futures::stream;
use adk_rust::{Content, Llm, LlmRequest, LlmResponse, LlmResponseStream, Part};
use async_trait::async_trait;
use histcourt_core::court::{ADMIRER, CRITIC, GREETER, JUDGE, VERDICT_WRITER};
use histcourt_core::tools::{LookupTool, StaticKnowledge, WriteFileTool};
use histcourt_core::{CourtResources, LookupConfig};
use serde_json::{Value, json};

/// Replays a fixed script; once it runs out the model answers with plain text.
pub struct ScriptedLlm {
    name: String,
    script: Mutex<VecDeque<LlmResponse>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, responses: Vec<LlmResponse>) {
        self.script.lock().unwrap().extend(responses);
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Llm for ScriptedLlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_content(
        &self,
        request: LlmRequest,
        _stream: bool,
    ) -> adk_rust::Result<LlmResponseStream> {
        let next = self.script.lock().unwrap().pop_front();
        self.requests.lock().unwrap().push(request);
        let response = next.unwrap_or_else(|| text(&format!("{} has nothing to add.", self.name)));
        Ok(Box::pin(stream::iter(vec![Ok(response)])))
    }
}

/// One scripted model per court role.
pub struct Court {
    roles: HashMap<&'static str, Arc<ScriptedLlm>>,
}

impl Court {
    pub fn new() -> Self {
        let roles = [GREETER, ADMIRER, CRITIC, JUDGE, VERDICT_WRITER]
            .into_iter()
            .map(|role| (role, Arc::new(ScriptedLlm::new(role))))
            .collect();
        Self { roles }
    }

    pub fn script(self, agent: &str, responses: Vec<LlmResponse>) -> Self {
        self.model(agent).push(responses);
        self
    }

    pub fn model(&self, agent: &str) -> Arc<ScriptedLlm> {
        self.roles[agent].clone()
    }

    /// Requests issued by `agent`, in order.
    pub fn requests_for(&self, agent: &str) -> Vec<LlmRequest> {
        self.model(agent).requests()
    }

    pub fn resources(&self, root: &Path) -> CourtResources {
        let lookup = Arc::new(LookupTool::new(Arc::new(knowledge()), &LookupConfig::default()));
        let shared: Arc<dyn Llm> = Arc::new(ScriptedLlm::new("unassigned"));
        self.roles.iter().fold(
            CourtResources::new(shared, lookup, Arc::new(WriteFileTool::new(root))),
            |resources, (role, model)| resources.with_role_model(role, model.clone()),
        )
    }
}

pub fn knowledge() -> StaticKnowledge {
    StaticKnowledge::new()
        .with_page(
            "Napoleon",
            "Napoleon",
            "Napoleon Bonaparte was a French military commander and political leader.",
        )
        .with_page(
            "Napoleon controversies",
            "Napoleonic Wars",
            "The Napoleonic Wars caused millions of deaths across Europe.",
        )
}

pub fn text(text: &str) -> LlmResponse {
    LlmResponse::new(Content::new("model").with_text(text))
}

pub fn calls(calls: Vec<(&str, Value)>) -> LlmResponse {
    let mut content = Content::new("model");
    content.parts = calls
        .into_iter()
        .map(|(name, args)| Part::FunctionCall {
            name: name.to_string(),
            args,
            id: None,
            thought_signature: None,
        })
        .collect();
    LlmResponse::new(content)
}

/// Every text part of the request, one per line.
pub fn transcript(request: &LlmRequest) -> String {
    request
        .contents
        .iter()
        .flat_map(|content| content.parts.iter().filter_map(Part::text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn append(field: &str, response: &str) -> (&'static str, Value) {
    (
        "append_to_state",
        json!({ "field": field, "response": response }),
    )
}

pub fn lookup(query: &str) -> (&'static str, Value) {
    ("wikipedia", json!({ "query": query }))
}
