//! The historical court: five agent roles wired into parallel, loop and sequential wrappers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use adk_rust::agent::{LlmAgent, LlmAgentBuilder, LoopAgent, ParallelAgent, SequentialAgent};
use adk_rust::futures::{StreamExt, stream};
use adk_rust::tool::ExitLoopTool;
use adk_rust::{AdkError, Agent, Event, EventStream, InvocationContext, Llm, ReadonlyContext, Tool};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::CourtError;
use crate::config::Config;
use crate::metrics;
use crate::state::TRIAL_TERMINATION;
use crate::tools::{AppendToStateTool, WriteFileTool};

pub const GREETER: &str = "judge_greeter";
pub const ADMIRER: &str = "admirer";
pub const CRITIC: &str = "critic_researcher";
pub const INVESTIGATION_TEAM: &str = "investigation_team";
pub const JUDGE: &str = "judge";
pub const TRIAL_LOOP: &str = "trial_loop";
pub const VERDICT_WRITER: &str = "verdict_writer";
pub const COURT: &str = "historical_court_system";

/// Knobs of the court that come from configuration.
#[derive(Debug, Clone)]
pub struct CourtSettings {
    pub language: String,
    pub verdict_directory: String,
    pub max_iterations: u32,
    pub max_tool_rounds: u32,
}

impl Default for CourtSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for CourtSettings {
    fn from(config: &Config) -> Self {
        Self {
            language: config.verdict.language.clone(),
            verdict_directory: config.verdict.directory.clone(),
            max_iterations: config.trial.max_iterations,
            max_tool_rounds: config.trial.max_tool_rounds,
        }
    }
}

/// One model for every role, optionally overridden per agent name.
#[derive(Clone)]
pub struct RoleModels {
    default: Arc<dyn Llm>,
    overrides: HashMap<String, Arc<dyn Llm>>,
}

impl RoleModels {
    pub fn new(default: Arc<dyn Llm>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_role(mut self, agent: impl Into<String>, model: Arc<dyn Llm>) -> Self {
        self.overrides.insert(agent.into(), model);
        self
    }

    pub fn for_role(&self, agent: &str) -> Arc<dyn Llm> {
        self.overrides
            .get(agent)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// How the trial loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "lowercase")]
pub enum LoopTermination {
    /// The judge called `exit_loop` during `iteration` (1-based).
    Signal { iteration: u32 },
    /// The iteration cap was reached without an exit signal.
    Cap { iterations: u32 },
}

impl fmt::Display for LoopTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal { iteration } => write!(f, "signal at iteration {iteration}"),
            Self::Cap { iterations } => write!(f, "cap after {iterations} iterations"),
        }
    }
}

/// Follows loop events to tell iterations apart and spot the exit signal.
///
/// An iteration starts with the first event after the closing agent spoke.
#[derive(Debug)]
struct IterationTracker {
    closing_agent: String,
    iteration: u32,
    after_closing: bool,
    signal: Option<u32>,
}

impl IterationTracker {
    fn new(closing_agent: impl Into<String>) -> Self {
        Self {
            closing_agent: closing_agent.into(),
            iteration: 0,
            after_closing: false,
            signal: None,
        }
    }

    /// Returns true when `event` opens a new iteration.
    fn observe(&mut self, event: &Event) -> bool {
        let closing = event.author == self.closing_agent;
        let started = self.iteration == 0 || (self.after_closing && !closing);
        if started {
            self.iteration += 1;
        }
        self.after_closing = closing;
        if event.actions.escalate && self.signal.is_none() {
            self.signal = Some(self.iteration);
        }
        started
    }

    fn termination(&self) -> LoopTermination {
        match self.signal {
            Some(iteration) => LoopTermination::Signal { iteration },
            None => LoopTermination::Cap {
                iterations: self.iteration,
            },
        }
    }
}

/// [`LoopAgent`] whose exit signal stops only this loop.
///
/// Escalations are cleared on the way out so the enclosing sequence still runs
/// the verdict writer. A closing event stores the [`LoopTermination`] under
/// `trial_termination`.
pub struct TrialLoop {
    inner: LoopAgent,
    closing_agent: String,
}

impl TrialLoop {
    pub fn new(inner: LoopAgent, closing_agent: impl Into<String>) -> Self {
        Self {
            inner,
            closing_agent: closing_agent.into(),
        }
    }
}

struct TrialProgress {
    events: EventStream,
    tracker: IterationTracker,
    loop_name: String,
    invocation_id: String,
}

impl TrialProgress {
    fn closing_event(&self) -> adk_rust::Result<Event> {
        let termination = self.tracker.termination();
        info!(agent = %self.loop_name, %termination, "trial ended");

        let value = serde_json::to_value(termination)
            .map_err(|err| AdkError::agent(format!("failed to encode termination: {err}")))?;
        let mut event = Event::new(self.invocation_id.clone());
        event.author = self.loop_name.clone();
        event
            .actions
            .state_delta
            .insert(TRIAL_TERMINATION.to_string(), value);
        Ok(event)
    }
}

#[async_trait]
impl Agent for TrialLoop {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        self.inner.sub_agents()
    }

    fn supports_agent_transfer(&self) -> bool {
        false
    }

    async fn run(&self, ctx: Arc<dyn InvocationContext>) -> adk_rust::Result<EventStream> {
        let progress = TrialProgress {
            events: self.inner.run(ctx.clone()).await?,
            tracker: IterationTracker::new(self.closing_agent.as_str()),
            loop_name: self.inner.name().to_string(),
            invocation_id: ctx.invocation_id().to_string(),
        };

        let events = stream::unfold(Some(progress), |progress| async move {
            let mut progress = progress?;
            match progress.events.next().await {
                Some(Ok(mut event)) => {
                    if progress.tracker.observe(&event) {
                        metrics::record_loop_iteration(&progress.loop_name);
                    }
                    event.actions.escalate = false;
                    Some((Ok(event), Some(progress)))
                }
                Some(Err(err)) => Some((Err(err), None)),
                None => Some((progress.closing_event(), None)),
            }
        });
        Ok(Box::pin(events))
    }
}

/// Every agent of the court, so callers can run or inspect any sub-tree.
#[derive(Clone)]
pub struct CourtAgents {
    pub greeter: Arc<LlmAgent>,
    pub admirer: Arc<LlmAgent>,
    pub critic: Arc<LlmAgent>,
    pub investigation_team: Arc<ParallelAgent>,
    pub judge: Arc<LlmAgent>,
    pub trial_loop: Arc<TrialLoop>,
    pub verdict_writer: Arc<LlmAgent>,
    pub court: Arc<SequentialAgent>,
}

impl CourtAgents {
    /// Build the court around its role models, a knowledge lookup tool and a file writer.
    pub fn build(
        models: &RoleModels,
        lookup: Arc<dyn Tool>,
        writer: Arc<WriteFileTool>,
        settings: &CourtSettings,
    ) -> Result<Self, CourtError> {
        let append: Arc<dyn Tool> = Arc::new(AppendToStateTool::new());
        let role = |name: &str| {
            LlmAgentBuilder::new(name)
                .model(models.for_role(name))
                .max_iterations(settings.max_tool_rounds)
        };

        let admirer = Arc::new(
            role(ADMIRER)
                .description(
                    "Researches the positive aspects and achievements of a historical figure or event.",
                )
                .instruction(ADMIRER_INSTRUCTION)
                .tool(lookup.clone())
                .tool(append.clone())
                .build()?,
        );

        let critic = Arc::new(
            role(CRITIC)
                .description(
                    "Researches the negative aspects, controversies, and failures of a historical figure or event.",
                )
                .instruction(CRITIC_INSTRUCTION)
                .tool(lookup)
                .tool(append.clone())
                .build()?,
        );

        let investigation_team = Arc::new(
            ParallelAgent::new(
                INVESTIGATION_TEAM,
                vec![admirer.clone() as Arc<dyn Agent>, critic.clone()],
            )
            .with_description("Gathers both positive and negative information in parallel."),
        );

        let judge = Arc::new(
            role(JUDGE)
                .description("Reviews the gathered information for balance and completeness.")
                .instruction(JUDGE_INSTRUCTION)
                .tool(append.clone())
                .tool(Arc::new(ExitLoopTool::new()))
                .build()?,
        );

        let trial_loop = Arc::new(TrialLoop::new(
            LoopAgent::new(
                TRIAL_LOOP,
                vec![investigation_team.clone() as Arc<dyn Agent>, judge.clone()],
            )
            .with_description("Iteratively gathers and reviews information until it is balanced.")
            .with_max_iterations(settings.max_iterations),
            JUDGE,
        ));

        let verdict_writer = Arc::new(
            role(VERDICT_WRITER)
                .description("Summarizes the findings and writes the final verdict to a file.")
                .instruction(verdict_instruction(settings))
                .tool(writer)
                .build()?,
        );

        let court = Arc::new(
            SequentialAgent::new(
                COURT,
                vec![trial_loop.clone() as Arc<dyn Agent>, verdict_writer.clone()],
            )
            .with_description("Runs the full historical court process."),
        );

        let greeter = Arc::new(
            role(GREETER)
                .description(
                    "Starts the historical court process by getting a topic from the user.",
                )
                .instruction(greeter_instruction(settings))
                .temperature(0.0)
                .tool(append)
                .build()?,
        );

        Ok(Self {
            greeter,
            admirer,
            critic,
            investigation_team,
            judge,
            trial_loop,
            verdict_writer,
            court,
        })
    }
}

const ADMIRER_INSTRUCTION: &str = "\
You are The Admirer. You look for the positive side of the subject in the PROMPT.
- Use the `wikipedia` tool to research its achievements, successes, positive impact and legacy.
- If CRITICAL_FEEDBACK asks for more positive material, address it specifically.
- Append a concise summary of what you found to the `pos_data` field with `append_to_state`.
- Finish with a short summary of your findings.

PROMPT: {PROMPT?}
CRITICAL_FEEDBACK: {CRITICAL_FEEDBACK?}
";

const CRITIC_INSTRUCTION: &str = "\
You are The Critic. You look for the negative side of the subject in the PROMPT.
- Use the `wikipedia` tool to research its controversies, criticism, failures and negative impact.
- If CRITICAL_FEEDBACK asks for more negative material, address it specifically.
- Append a concise summary of what you found to the `neg_data` field with `append_to_state`.
- Finish with a short summary of your findings.

PROMPT: {PROMPT?}
CRITICAL_FEEDBACK: {CRITICAL_FEEDBACK?}
";

const JUDGE_INSTRUCTION: &str = "\
You are the Judge. Review the positive and negative evidence below.
- If either side is empty or the two sides are unbalanced, say what is missing by appending
  feedback to the `CRITICAL_FEEDBACK` field with `append_to_state`. Name the side that needs work.
- If both sides are sufficient and balanced, call `exit_loop` to close the trial.
- Explain your decision.

POSITIVE DATA:
{pos_data?}

NEGATIVE DATA:
{neg_data?}
";

fn verdict_instruction(settings: &CourtSettings) -> String {
    format!(
        "\
You are the Verdict Writer. Produce a neutral, balanced report comparing the evidence below.
- Save it with the `write_file` tool.
- The directory must be '{directory}'.
- The filename must be derived from the PROMPT and end with '.txt'.
- Structure the report with a section on positive aspects, a section on negative aspects
  and a concluding summary.
- Write the entire report in {language}.

PROMPT: {{PROMPT?}}
POSITIVE DATA: {{pos_data?}}
NEGATIVE DATA: {{neg_data?}}
",
        directory = settings.verdict_directory,
        language = settings.language,
    )
}

fn greeter_instruction(settings: &CourtSettings) -> String {
    format!(
        "\
- Greet the user and explain that you will help them hold a mock trial of a historical figure or event.
- Ask which topic they want to investigate.
- When they name a topic, store it in the `PROMPT` field with `append_to_state`, then tell them the
  investigation is starting.
- Answer in {language}.
",
        language = settings.language,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LookupConfig;
    use crate::tools::{LookupTool, StaticKnowledge};
    use adk_rust::model::MockLlm;

    fn court(settings: &CourtSettings) -> CourtAgents {
        let lookup = Arc::new(LookupTool::new(
            Arc::new(StaticKnowledge::new()),
            &LookupConfig::default(),
        ));
        CourtAgents::build(
            &RoleModels::new(Arc::new(MockLlm::new("silent"))),
            lookup,
            Arc::new(WriteFileTool::default()),
            settings,
        )
        .unwrap()
    }

    fn names(agents: &[Arc<dyn Agent>]) -> Vec<&str> {
        agents.iter().map(|agent| agent.name()).collect()
    }

    fn event(author: &str, escalate: bool) -> Event {
        let mut event = Event::new("inv-1");
        event.author = author.to_string();
        event.actions.escalate = escalate;
        event
    }

    #[test]
    fn court_tree_matches_the_trial_layout() {
        let agents = court(&CourtSettings::default());

        assert_eq!(
            names(agents.court.sub_agents()),
            vec![TRIAL_LOOP, VERDICT_WRITER]
        );
        assert_eq!(
            names(agents.trial_loop.sub_agents()),
            vec![INVESTIGATION_TEAM, JUDGE]
        );
        assert_eq!(
            names(agents.investigation_team.sub_agents()),
            vec![ADMIRER, CRITIC]
        );
        assert_eq!(agents.greeter.name(), GREETER);
        assert!(agents.greeter.sub_agents().is_empty());
        assert!(!agents.trial_loop.supports_agent_transfer());
    }

    #[test]
    fn role_models_fall_back_to_the_default() {
        let models = RoleModels::new(Arc::new(MockLlm::new("shared")))
            .with_role(JUDGE, Arc::new(MockLlm::new("strict")));
        assert_eq!(models.for_role(JUDGE).name(), "strict");
        assert_eq!(models.for_role(ADMIRER).name(), "shared");
    }

    #[test]
    fn tracker_counts_iterations_by_closing_turns() {
        let mut tracker = IterationTracker::new(JUDGE);
        let opened: Vec<bool> = [
            event(ADMIRER, false),
            event(CRITIC, false),
            event(JUDGE, false),
            event(JUDGE, false),
            event(CRITIC, false),
            event(JUDGE, true),
        ]
        .iter()
        .map(|event| tracker.observe(event))
        .collect();

        assert_eq!(opened, vec![true, false, false, false, true, false]);
        assert_eq!(
            tracker.termination(),
            LoopTermination::Signal { iteration: 2 }
        );
    }

    #[test]
    fn tracker_reports_the_cap_without_a_signal() {
        let mut tracker = IterationTracker::new(JUDGE);
        for author in [ADMIRER, JUDGE, ADMIRER, JUDGE, ADMIRER, JUDGE] {
            tracker.observe(&event(author, false));
        }
        assert_eq!(
            tracker.termination(),
            LoopTermination::Cap { iterations: 3 }
        );
        assert_eq!(tracker.termination().to_string(), "cap after 3 iterations");
    }

    #[test]
    fn termination_serializes_with_a_reason_tag() {
        insta::assert_snapshot!(
            serde_json::to_string(&LoopTermination::Signal { iteration: 2 }).unwrap(),
            @r#"{"reason":"signal","iteration":2}"#
        );
    }

    #[test]
    fn settings_flow_into_instructions() {
        let settings = CourtSettings {
            language: "English".into(),
            verdict_directory: "rulings".into(),
            ..CourtSettings::default()
        };
        let writer = verdict_instruction(&settings);
        assert!(writer.contains("The directory must be 'rulings'."));
        assert!(writer.contains("in English."));
        assert!(writer.contains("PROMPT: {PROMPT?}"));
        assert!(greeter_instruction(&settings).contains("Answer in English."));
    }
}
