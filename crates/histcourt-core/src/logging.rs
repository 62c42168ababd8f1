use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const LOG_DIR_ENV: &str = "HISTCOURT_LOG_DIR";
const DEFAULT_LOG_DIR: &str = "data/logs";

static REDACTION_PATTERNS: Lazy<Vec<(String, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key".to_string(),
            Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid api_key regex"),
        ),
        (
            "secret".to_string(),
            Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid secret regex"),
        ),
        (
            "bearer".to_string(),
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "google_key".to_string(),
            Regex::new(r"(AIza[0-9A-Za-z\-_]{35})").expect("invalid google_key regex"),
        ),
    ]
});

/// Where session logs live.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub base_dir: PathBuf,
}

impl LogSettings {
    pub fn from_env() -> Self {
        let base_dir = std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR));
        Self { base_dir }
    }
}

#[derive(Debug, Clone)]
pub struct SessionLogInput {
    pub session_id: String,
    pub status: String,
    pub prompt: Option<String>,
    pub summary: Option<String>,
    pub termination: Option<String>,
    pub written_files: Vec<String>,
    pub trace_path: Option<String>,
}

#[derive(Serialize)]
struct SessionLogRecord {
    timestamp: String,
    session_id: String,
    status: String,
    prompt: Option<String>,
    summary: Option<String>,
    termination: Option<String>,
    written_files: Vec<String>,
    trace_path: Option<String>,
    redactions: Vec<String>,
}

#[derive(Serialize)]
struct AuditLogRecord {
    timestamp: String,
    session_id: String,
    redactions: Vec<String>,
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let line = serde_json::to_string(value)?;
    writeln!(writer, "{}", line)
        .with_context(|| format!("failed to append log entry to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn sanitize_text(input: &str, redactions: &mut BTreeSet<String>) -> String {
    let mut output = input.to_string();
    for (name, regex) in REDACTION_PATTERNS.iter() {
        let mut matched = false;
        output = regex
            .replace_all(&output, |caps: &Captures| {
                matched = true;
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
        if matched {
            redactions.insert(name.clone());
        }
    }
    output
}

/// Append a completed-session record using `HISTCOURT_LOG_DIR` settings.
pub fn log_session_completion(input: SessionLogInput) -> Result<()> {
    log_session_completion_in(&LogSettings::from_env(), input)
}

pub fn log_session_completion_in(settings: &LogSettings, input: SessionLogInput) -> Result<()> {
    let timestamp = Utc::now();
    let mut redactions = BTreeSet::new();

    let prompt = input
        .prompt
        .as_deref()
        .map(|value| sanitize_text(value, &mut redactions));
    let summary = input
        .summary
        .as_deref()
        .map(|value| sanitize_text(value, &mut redactions));

    let record = SessionLogRecord {
        timestamp: timestamp.to_rfc3339(),
        session_id: input.session_id.clone(),
        status: input.status,
        prompt,
        summary,
        termination: input.termination,
        written_files: input.written_files,
        trace_path: input.trace_path,
        redactions: redactions.iter().cloned().collect(),
    };

    let month_dir = settings
        .base_dir
        .join(format!("{:04}", timestamp.year()))
        .join(format!("{:02}", timestamp.month()));
    let session_log_path = month_dir.join("session.jsonl");
    append_json_line(&session_log_path, &record)?;

    if !record.redactions.is_empty() {
        let audit = AuditLogRecord {
            timestamp: record.timestamp.clone(),
            session_id: input.session_id.clone(),
            redactions: record.redactions.clone(),
        };
        let audit_path = month_dir.join("audit.jsonl");
        append_json_line(&audit_path, &audit)?;
        warn!(
            session_id = %input.session_id,
            fields = ?record.redactions,
            "redacted potential secrets from session log"
        );
    }

    Ok(())
}

/// Remove every log line of `session_id` using `HISTCOURT_LOG_DIR` settings.
pub fn remove_session_logs(session_id: &str) -> Result<()> {
    remove_session_logs_in(&LogSettings::from_env().base_dir, session_id)
}

pub fn remove_session_logs_in(base_dir: &Path, session_id: &str) -> Result<()> {
    if !base_dir.exists() {
        return Ok(());
    }

    for year_entry in fs::read_dir(base_dir)? {
        let year_entry = year_entry?;
        if !year_entry.file_type()?.is_dir() {
            continue;
        }
        for month_entry in fs::read_dir(year_entry.path())? {
            let month_entry = month_entry?;
            if !month_entry.file_type()?.is_dir() {
                continue;
            }
            let session_path = month_entry.path().join("session.jsonl");
            rewrite_jsonl_without(&session_path, session_id)?;
            cleanup_empty_file(&session_path)?;

            let audit_path = month_entry.path().join("audit.jsonl");
            rewrite_jsonl_without(&audit_path, session_id)?;
            cleanup_empty_file(&audit_path)?;

            if month_entry.path().read_dir()?.next().is_none() {
                fs::remove_dir(month_entry.path()).ok();
            }
        }
        if year_entry.path().read_dir()?.next().is_none() {
            fs::remove_dir(year_entry.path()).ok();
        }
    }

    Ok(())
}

fn rewrite_jsonl_without(path: &Path, session_id: &str) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let file =
        File::open(path).with_context(|| format!("failed to open log file {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut retained = Vec::new();
    let mut removed = false;
    for line in reader.lines() {
        let line = line?;
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) {
            if value.get("session_id").and_then(|v| v.as_str()) == Some(session_id) {
                removed = true;
                continue;
            }
        }
        retained.push(line);
    }

    if removed {
        let file = File::create(path)
            .with_context(|| format!("failed to rewrite log file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for line in retained {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
    }

    Ok(())
}

fn cleanup_empty_file(path: &Path) -> Result<()> {
    if path.exists() {
        let metadata = path.metadata()?;
        if metadata.len() == 0 {
            fs::remove_file(path).ok();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    fn input(session_id: &str, prompt: &str) -> SessionLogInput {
        SessionLogInput {
            session_id: session_id.to_string(),
            status: "completed".to_string(),
            prompt: Some(prompt.to_string()),
            summary: Some("Verdict written. bearer abc.def".to_string()),
            termination: Some("signal at iteration 2".to_string()),
            written_files: vec!["verdicts/napoleon.txt".to_string()],
            trace_path: None,
        }
    }

    fn month_dir(base: &Path) -> Result<PathBuf> {
        let year_dir = base.read_dir()?.next().unwrap()?.path();
        Ok(year_dir.read_dir()?.next().unwrap()?.path())
    }

    #[test]
    fn session_logging_sanitizes_and_persists() -> Result<()> {
        let temp = TempDir::new()?;
        let settings = LogSettings {
            base_dir: temp.path().to_path_buf(),
        };

        log_session_completion_in(&settings, input("s-1", "Napoleon api_key=abcd1234"))?;

        let month_dir = month_dir(temp.path())?;
        let line = fs::read_to_string(month_dir.join("session.jsonl"))?;
        let record: Value = serde_json::from_str(line.trim())?;
        assert_eq!(record["session_id"], "s-1");
        assert_eq!(record["prompt"], "Napoleon api_key=[REDACTED]");
        assert_eq!(record["summary"], "Verdict written. bearer [REDACTED]");
        assert_eq!(
            record["redactions"],
            serde_json::json!(["api_key", "bearer"])
        );
        assert!(month_dir.join("audit.jsonl").exists());
        Ok(())
    }

    #[test]
    fn removing_a_session_keeps_other_sessions() -> Result<()> {
        let temp = TempDir::new()?;
        let settings = LogSettings {
            base_dir: temp.path().to_path_buf(),
        };
        log_session_completion_in(&settings, input("keep", "Cleopatra"))?;
        log_session_completion_in(&settings, input("drop", "Napoleon"))?;

        remove_session_logs_in(temp.path(), "drop")?;

        let session_log = month_dir(temp.path())?.join("session.jsonl");
        let remaining = fs::read_to_string(session_log)?;
        assert_eq!(remaining.lines().count(), 1);
        assert!(remaining.contains("\"keep\""));
        Ok(())
    }
}
