//! Orchestration modes and the entry point that runs one user turn.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cirrus_tools::{ActivationReport, ToolManager, ToolScope};
use cirrus_types::{CirrusError, Message, Usage, provider::Provider};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentEvent, AgentSettings};
use crate::conversation::Session;
use crate::error::ModeParseError;
use crate::pipeline::Pipeline;
use crate::prompts;
use crate::team::Team;

/// How a user turn is answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One agent with keyword-activated tools.
    #[default]
    Single,
    /// Classifier, then specialist, then optional synthesis.
    Pipeline,
    /// A coordinator delegating to specialists.
    Team,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Single => "single",
            Mode::Pipeline => "pipeline",
            Mode::Team => "team",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Mode::Single),
            "pipeline" => Ok(Mode::Pipeline),
            "team" => Ok(Mode::Team),
            other => Err(ModeParseError(other.to_string())),
        }
    }
}

/// Answers user turns in one of the orchestration modes.
pub enum Driver {
    Single(Agent),
    Pipeline(Pipeline),
    Team(Team),
}

impl Driver {
    pub fn new(mode: Mode, provider: Arc<dyn Provider>, settings: AgentSettings) -> Self {
        match mode {
            Mode::Single => Driver::Single(
                Agent::new("Assistant", provider, settings).with_system_prompt(prompts::ASSISTANT),
            ),
            Mode::Pipeline => Driver::Pipeline(Pipeline::new(provider, settings)),
            Mode::Team => Driver::Team(Team::new(provider, settings)),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Driver::Single(_) => Mode::Single,
            Driver::Pipeline(_) => Mode::Pipeline,
            Driver::Team(_) => Mode::Team,
        }
    }

    /// Answer `prompt` within `session`.
    ///
    /// Events arrive in production order. On success the last two events are
    /// `Usage` and `Done`. Errors are returned, not emitted.
    pub async fn respond<F>(
        &self,
        session: &mut Session,
        prompt: &str,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<Usage, CirrusError>
    where
        F: FnMut(AgentEvent),
    {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(CirrusError::Other("Message must not be empty".to_string()));
        }
        tracing::info!(session = %session.id(), mode = %self.mode(), "Handling user turn");

        // A failed turn is dropped from the history.
        let checkpoint = session.conversation.len();
        let result = match self {
            Driver::Single(agent) => {
                respond_single(agent, session, prompt, cancel, &mut on_event).await
            }
            Driver::Pipeline(pipeline) => {
                pipeline.respond(session, prompt, cancel, &mut on_event).await
            }
            Driver::Team(team) => team.respond(session, prompt, cancel, &mut on_event).await,
        };
        let usage = match result {
            Ok(usage) => usage,
            Err(e) => {
                session.conversation.messages.truncate(checkpoint);
                return Err(e);
            }
        };

        on_event(AgentEvent::Usage(usage.clone()));
        on_event(AgentEvent::Done);
        Ok(usage)
    }
}

async fn respond_single<F>(
    agent: &Agent,
    session: &mut Session,
    prompt: &str,
    cancel: &CancellationToken,
    on_event: &mut F,
) -> Result<Usage, CirrusError>
where
    F: FnMut(AgentEvent),
{
    session.conversation.push(Message::user(prompt));

    let report = tokio::select! {
        _ = cancel.cancelled() => return Err(CirrusError::Cancelled),
        report = session.tools.activate_for_prompt(prompt) => report,
    };
    report_activation(&report, on_event);

    let output = agent
        .run_turn(
            &mut session.conversation.messages,
            &session.tools,
            &ToolScope::All,
            cancel,
            &mut *on_event,
        )
        .await?;
    Ok(output.usage)
}

/// Start `categories` for a specialist unless the turn is cancelled first.
pub(crate) async fn activate_for_specialist<F>(
    tools: &mut ToolManager,
    categories: &[&str],
    cancel: &CancellationToken,
    on_event: &mut F,
) -> Result<(), CirrusError>
where
    F: FnMut(AgentEvent),
{
    let report = tokio::select! {
        _ = cancel.cancelled() => return Err(CirrusError::Cancelled),
        report = tools.activate_all(categories) => report,
    };
    report_activation(&report, on_event);
    Ok(())
}

pub(crate) fn report_activation<F>(report: &ActivationReport, on_event: &mut F)
where
    F: FnMut(AgentEvent),
{
    for line in report.status_lines() {
        on_event(AgentEvent::Status(line));
    }
}
