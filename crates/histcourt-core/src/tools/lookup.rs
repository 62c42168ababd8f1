use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use adk_rust::{ReadonlyContext, Tool, ToolContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{required_str, soft_failure};
use crate::ToolError;
use crate::config::LookupConfig;

const NO_RESULT: &str = "No good Wikipedia Search Result was found";
const USER_AGENT: &str = concat!("histcourt/", env!("CARGO_PKG_VERSION"));

/// A page of reference text.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgePage {
    pub title: String,
    pub summary: String,
}

#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgePage>, ToolError>;
}

/// MediaWiki search + intro extracts.
pub struct WikipediaSource {
    http: reqwest::Client,
    endpoint: String,
}

impl WikipediaSource {
    pub fn new(language: &str) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ToolError::Lookup(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("https://{language}.wikipedia.org/w/api.php"),
        })
    }

    async fn query<T: for<'de> Deserialize<'de>>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<T, ToolError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(params)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| ToolError::Lookup(err.to_string()))?;
        response
            .json::<T>()
            .await
            .map_err(|err| ToolError::Lookup(err.to_string()))
    }
}

#[derive(Deserialize, Default)]
struct SearchPayload {
    #[serde(default)]
    query: SearchQuery,
}

#[derive(Deserialize, Default)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize, Default)]
struct ExtractPayload {
    #[serde(default)]
    query: ExtractQuery,
}

#[derive(Deserialize, Default)]
struct ExtractQuery {
    #[serde(default)]
    pages: HashMap<String, ExtractPage>,
}

#[derive(Deserialize)]
struct ExtractPage {
    title: String,
    #[serde(default)]
    extract: Option<String>,
}

#[async_trait]
impl KnowledgeSource for WikipediaSource {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgePage>, ToolError> {
        let limit = limit.to_string();
        let hits: SearchPayload = self
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("format", "json"),
                ("srsearch", query),
                ("srlimit", &limit),
            ])
            .await?;

        let mut pages = Vec::new();
        for hit in hits.query.search {
            let payload: ExtractPayload = self
                .query(&[
                    ("action", "query"),
                    ("prop", "extracts"),
                    ("exintro", "1"),
                    ("explaintext", "1"),
                    ("redirects", "1"),
                    ("format", "json"),
                    ("titles", &hit.title),
                ])
                .await?;
            let page = payload.query.pages.into_values().next();
            match page.and_then(|page| page.extract.map(|summary| (page.title, summary))) {
                Some((title, summary)) if !summary.trim().is_empty() => {
                    pages.push(KnowledgePage { title, summary })
                }
                _ => debug!(title = %hit.title, "skipping page without extract"),
            }
        }
        Ok(pages)
    }
}

/// In-memory knowledge source keyed by lowercase search term.
#[derive(Default)]
pub struct StaticKnowledge {
    pages: Vec<(String, KnowledgePage)>,
}

impl StaticKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(
        mut self,
        term: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        self.pages.push((
            term.into().to_lowercase(),
            KnowledgePage {
                title: title.into(),
                summary: summary.into(),
            },
        ));
        self
    }
}

#[async_trait]
impl KnowledgeSource for StaticKnowledge {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgePage>, ToolError> {
        let query = query.to_lowercase();
        Ok(self
            .pages
            .iter()
            .filter(|(term, _)| query.contains(term.as_str()))
            .take(limit)
            .map(|(_, page)| page.clone())
            .collect())
    }
}

/// `wikipedia` tool backed by any [`KnowledgeSource`].
pub struct LookupTool {
    source: Arc<dyn KnowledgeSource>,
    top_k_results: usize,
    max_chars: usize,
}

impl LookupTool {
    pub fn new(source: Arc<dyn KnowledgeSource>, settings: &LookupConfig) -> Self {
        Self {
            source,
            top_k_results: settings.top_k_results.max(1),
            max_chars: settings.max_chars,
        }
    }

    pub fn wikipedia(settings: &LookupConfig) -> Result<Self, ToolError> {
        let source = WikipediaSource::new(&settings.language)?;
        Ok(Self::new(Arc::new(source), settings))
    }

    fn format(&self, pages: &[KnowledgePage]) -> String {
        if pages.is_empty() {
            return NO_RESULT.to_string();
        }
        let joined = pages
            .iter()
            .map(|page| format!("Page: {}\nSummary: {}", page.title, page.summary))
            .collect::<Vec<_>>()
            .join("\n\n");
        joined.chars().take(self.max_chars).collect()
    }
}

#[async_trait]
impl Tool for LookupTool {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> &str {
        "A wrapper around Wikipedia. Useful for when you need to answer general questions about \
         people, places, companies, facts, historical events, or other subjects. Input should be \
         a search query."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query."
                }
            },
            "required": ["query"]
        }))
    }

    async fn execute(&self, ctx: Arc<dyn ToolContext>, args: Value) -> adk_rust::Result<Value> {
        let query = match required_str(&args, "query") {
            Ok(query) => query,
            Err(err) => return Ok(soft_failure(&err)),
        };

        match self.source.search(query, self.top_k_results).await {
            Ok(pages) => {
                info!(agent = %ctx.agent_name(), %query, pages = pages.len(), "lookup finished");
                Ok(json!({ "result": self.format(&pages) }))
            }
            Err(err) => {
                warn!(agent = %ctx.agent_name(), %query, error = %err, "lookup failed");
                Ok(soft_failure(&err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adk_rust::tool::SimpleToolContext;

    struct Unreachable;

    #[async_trait]
    impl KnowledgeSource for Unreachable {
        async fn search(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<KnowledgePage>, ToolError> {
            Err(ToolError::Lookup("connection refused".into()))
        }
    }

    fn tool(max_chars: usize) -> LookupTool {
        let source = StaticKnowledge::new()
            .with_page("napoleon", "Napoleon", "French emperor.")
            .with_page("napoleon", "Napoleonic Code", "Civil code of 1804.");
        LookupTool::new(
            Arc::new(source),
            &LookupConfig {
                max_chars,
                ..LookupConfig::default()
            },
        )
    }

    fn context(agent: &str) -> Arc<SimpleToolContext> {
        Arc::new(SimpleToolContext::new(agent))
    }

    #[tokio::test]
    async fn formats_pages_like_wikipedia_wrapper() {
        let result = tool(4_000)
            .execute(context("admirer"), json!({"query": "Napoleon achievements"}))
            .await
            .unwrap();
        assert_eq!(
            result["result"],
            "Page: Napoleon\nSummary: French emperor.\n\nPage: Napoleonic Code\nSummary: Civil code of 1804."
        );
    }

    #[tokio::test]
    async fn truncates_and_reports_empty_results() {
        let lookup = tool(14);

        let result = lookup
            .execute(context("critic_researcher"), json!({"query": "napoleon"}))
            .await
            .unwrap();
        assert_eq!(result["result"], "Page: Napoleon");

        let result = lookup
            .execute(context("critic_researcher"), json!({"query": "cleopatra"}))
            .await
            .unwrap();
        assert_eq!(result["result"], NO_RESULT);
    }

    #[tokio::test]
    async fn source_failures_are_reported_to_the_model() {
        let lookup = LookupTool::new(Arc::new(Unreachable), &LookupConfig::default());
        let result = lookup
            .execute(context("admirer"), json!({"query": "Napoleon"}))
            .await
            .unwrap();
        assert_eq!(result["error"], "lookup failed: connection refused");
    }
}
