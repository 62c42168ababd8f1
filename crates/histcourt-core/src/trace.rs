use std::fmt::Write as _;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub agent: String,
    pub message: String,
    pub timestamp_ms: u128,
}

impl TraceEvent {
    pub fn new(agent: impl Into<String>, message: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self {
            agent: agent.into(),
            message: message.into(),
            timestamp_ms,
        }
    }
}

/// Shared, append-only log of agent and tool events for one session.
///
/// Clones share the same buffer so concurrently running agents record into one trace.
#[derive(Debug, Clone, Default)]
pub struct TraceCollector {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, agent: impl Into<String>, message: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TraceEvent::new(agent, message));
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary::from_events(&self.events())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub agent: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: Vec<TraceStep>,
}

impl TraceSummary {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        let steps = events
            .iter()
            .enumerate()
            .map(|(idx, event)| TraceStep {
                index: idx + 1,
                agent: event.agent.clone(),
                message: event.message.clone(),
            })
            .collect();
        Self { steps }
    }

    pub fn render_markdown(&self) -> String {
        if self.steps.is_empty() {
            return "No trace events recorded.".to_string();
        }
        let mut output = String::from("### Trace Summary\n");
        for step in &self.steps {
            let _ = writeln!(
                output,
                "{}. {} -> {}",
                step.index,
                step.agent,
                step.message.replace('\n', " ")
            );
        }
        output
    }
}

pub fn trace_path<P: AsRef<Path>>(dir: P, session_id: &str) -> PathBuf {
    dir.as_ref().join(format!("{session_id}.json"))
}

pub fn persist_trace<P: AsRef<Path>>(
    dir: P,
    session_id: &str,
    events: &[TraceEvent],
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    create_dir_all(dir)
        .with_context(|| format!("failed to create trace directory {}", dir.display()))?;
    let path = trace_path(dir, session_id);
    let payload = serde_json::to_vec_pretty(events)?;
    let mut file = File::create(&path)
        .with_context(|| format!("failed to create trace file {}", path.display()))?;
    file.write_all(&payload)
        .with_context(|| format!("failed to write trace file {}", path.display()))?;
    Ok(path)
}
