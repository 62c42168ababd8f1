//! Historical court core built on `adk-rust` agents and `graph_flow` turn-taking.
//!
//! A greeter collects a topic from the user, then an Admirer and a Critic
//! research it in parallel while a Judge loops them until the evidence is
//! balanced. A Verdict Writer saves the final report to disk.

mod config;
pub mod court;
mod error;
mod logging;
mod metrics;
pub mod model;
mod runtime;
mod security;
pub mod state;
mod tasks;
mod telemetry;
pub mod tools;
mod trace;
mod workflow;

pub use config::{
    Config, ConfigLoader, LoggingConfig, LookupConfig, ModelConfig, RetryConfig, TrialConfig,
    VerdictConfig,
};
pub use court::{CourtAgents, CourtSettings, LoopTermination, RoleModels, TrialLoop};
pub use error::{CourtError, ToolError};
pub use logging::{
    LogSettings, SessionLogInput, log_session_completion, log_session_completion_in,
    remove_session_logs, remove_session_logs_in,
};
pub use metrics::init_metrics_from_env;
pub use model::model_from_config;
pub use runtime::CourtRuntime;
pub use security::{SecretValue, require_env};
pub use tasks::{CourtTask, GreeterTask};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{TraceCollector, TraceEvent, TraceStep, TraceSummary, persist_trace, trace_path};
pub use workflow::{
    CourtResources, ScriptedInput, SessionOptions, SessionOutcome, SessionStatus, UserInput,
    run_court_session,
};
