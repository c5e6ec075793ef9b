//! Team mode: a coordinator assigns tasks to specialists by name and
//! summarizes their results.

use std::sync::Arc;

use cirrus_tools::{Catalog, ToolScope};
use cirrus_types::{CirrusError, Message, Usage, provider::Provider};
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentEvent, AgentSettings};
use crate::conversation::Session;
use crate::driver::activate_for_specialist;
use crate::prompts;

/// Coordinator turns allowed per user turn.
pub const DEFAULT_MAX_ROUNDS: usize = 4;

const TERMINATE: &str = "TERMINATE";

/// One `@Agent: task` line from the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub agent: String,
    pub task: String,
}

/// Extract assignments from coordinator output. Lines may carry list
/// markers (`1.`, `-`, `*`); the leading `@` is optional but the name must
/// end in `Agent`.
pub fn parse_assignments(text: &str) -> Vec<Assignment> {
    text.lines().filter_map(parse_assignment_line).collect()
}

fn parse_assignment_line(line: &str) -> Option<Assignment> {
    let line = line
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(['.', ')', '-', '*'])
        .trim_start()
        .trim_start_matches("**");
    let line = line.strip_prefix('@').unwrap_or(line);

    let (name, task) = line.split_once(':')?;
    let name = name.trim().trim_end_matches("**");
    let task = task.trim().trim_start_matches("**").trim();
    let well_formed = name.ends_with("Agent")
        && name.chars().all(|c| c.is_ascii_alphanumeric())
        && !task.is_empty();
    well_formed.then(|| Assignment {
        agent: name.to_string(),
        task: task.to_string(),
    })
}

/// Tool rounds for the infrastructure-as-code specialist, which edits files
/// and opens pull requests in one task.
pub const CODER_MAX_TOOL_ROUNDS: usize = 15;

struct Member {
    agent: Agent,
    /// Categories whose tools the member may call. The first one decides
    /// whether the member is on the team at all.
    categories: &'static [&'static str],
    description: &'static str,
}

impl Member {
    /// The member's categories that can run with `catalog`.
    fn runnable(&self, catalog: &Catalog) -> Vec<&'static str> {
        self.categories
            .iter()
            .copied()
            .filter(|name| catalog.get(name).is_some_and(|c| c.is_available()))
            .collect()
    }
}

/// Forwards team events, putting a blank line between the text of one agent
/// and the next.
struct TeamStream<'a, F> {
    inner: &'a mut F,
    streamed: bool,
    new_agent: bool,
}

impl<'a, F: FnMut(AgentEvent)> TeamStream<'a, F> {
    fn new(inner: &'a mut F) -> Self {
        Self {
            inner,
            streamed: false,
            new_agent: false,
        }
    }

    fn emit(&mut self, event: AgentEvent) {
        match &event {
            AgentEvent::AgentStarted { .. } => self.new_agent = true,
            AgentEvent::TextDelta(_) => {
                if self.streamed && self.new_agent {
                    (self.inner)(AgentEvent::TextDelta("\n\n".to_string()));
                }
                self.streamed = true;
                self.new_agent = false;
            }
            _ => {}
        }
        (self.inner)(event);
    }
}

/// A coordinator plus specialists for the tool categories.
pub struct Team {
    coordinator: Agent,
    members: Vec<Member>,
    max_rounds: usize,
}

impl Team {
    pub fn new(provider: Arc<dyn Provider>, settings: AgentSettings) -> Self {
        let member = |name: &str,
                      prompt: &str,
                      categories: &'static [&'static str],
                      description: &'static str| Member {
            agent: Agent::new(name, Arc::clone(&provider), settings.clone())
                .with_system_prompt(prompt),
            categories,
            description,
        };
        let mut coder = member(
            "InfraCoderAgent",
            prompts::INFRA_CODER_SPECIALIST,
            &["github", "playwright"],
            "Handles Terraform/Bicep coding tasks: browses AVM modules, creates branches and pull requests",
        );
        coder.agent = coder
            .agent
            .with_max_tool_rounds(settings.max_tool_rounds.max(CODER_MAX_TOOL_ROUNDS));

        Self {
            coordinator: Agent::new("Coordinator", Arc::clone(&provider), settings.clone()),
            members: vec![
                member(
                    "AzureAgent",
                    prompts::AZURE_SPECIALIST,
                    &["azure"],
                    "Handles Azure infrastructure queries and commands",
                ),
                member(
                    "GitHubAgent",
                    prompts::GITHUB_SPECIALIST,
                    &["github"],
                    "Handles GitHub repository analysis",
                ),
                coder,
                member(
                    "DevOpsAgent",
                    prompts::DEVOPS_SPECIALIST,
                    &["ado"],
                    "Handles Azure DevOps projects, pipelines and work items",
                ),
                member(
                    "WebAgent",
                    prompts::WEB_SPECIALIST,
                    &["playwright"],
                    "Browses the live web with Playwright",
                ),
            ],
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Names of the specialists whose category can run in `session`.
    pub fn available_members(&self, session: &Session) -> Vec<&str> {
        self.available(session)
            .into_iter()
            .map(|m| m.agent.name())
            .collect()
    }

    fn available(&self, session: &Session) -> Vec<&Member> {
        if !session.tools.is_enabled() {
            return Vec::new();
        }
        let catalog = session.tools.catalog();
        self.members
            .iter()
            .filter(|m| {
                m.categories
                    .first()
                    .and_then(|name| catalog.get(name))
                    .is_some_and(|c| c.is_available())
            })
            .collect()
    }

    pub(crate) async fn respond<F>(
        &self,
        session: &mut Session,
        prompt: &str,
        cancel: &CancellationToken,
        on_event: &mut F,
    ) -> Result<Usage, CirrusError>
    where
        F: FnMut(AgentEvent),
    {
        let available = self.available(session);
        let roster: Vec<(&str, &str)> = available
            .iter()
            .map(|m| (m.agent.name(), m.description))
            .collect();
        let coordinator = self
            .coordinator
            .clone()
            .with_system_prompt(prompts::coordinator(&roster));

        session.conversation.push(Message::user(prompt));
        let mut transcript = session.conversation.messages.clone();
        let mut stream = TeamStream::new(on_event);
        let mut usage = Usage::default();
        let mut answer = String::new();
        // Specialist results the coordinator has not seen yet.
        let mut unreported = false;

        for round in 0..self.max_rounds {
            stream.emit(AgentEvent::AgentStarted {
                agent: coordinator.name().to_string(),
            });
            let output = coordinator
                .run_turn(
                    &mut transcript,
                    &session.tools,
                    &ToolScope::None,
                    cancel,
                    |e| stream.emit(e),
                )
                .await?;
            usage.add(&output.usage);
            answer = output.text;
            unreported = false;

            let assignments = parse_assignments(&answer);
            if answer.contains(TERMINATE) || assignments.is_empty() {
                break;
            }
            tracing::debug!(round, assignments = assignments.len(), "Coordinator delegated");

            for assignment in assignments {
                let Some(member) = available.iter().find(|m| m.agent.name() == assignment.agent)
                else {
                    let note = format!("{} is not available in this team", assignment.agent);
                    stream.emit(AgentEvent::Status(note.clone()));
                    transcript.push(Message::user(note));
                    continue;
                };

                stream.emit(AgentEvent::AgentStarted {
                    agent: member.agent.name().to_string(),
                });
                let categories = member.runnable(session.tools.catalog());
                activate_for_specialist(&mut session.tools, &categories, cancel, &mut |e| {
                    stream.emit(e)
                })
                .await?;
                let scope = ToolScope::Categories(categories.iter().map(|c| c.to_string()).collect());
                let mut messages = vec![Message::user(assignment.task)];
                let output = member
                    .agent
                    .run_turn(&mut messages, &session.tools, &scope, cancel, |e| {
                        stream.emit(e)
                    })
                    .await?;
                usage.add(&output.usage);
                transcript.push(Message::user(format!(
                    "{} result:\n{}",
                    member.agent.name(),
                    output.text
                )));
                unreported = true;
            }
        }

        // Out of rounds with results pending: one last coordinator turn to
        // summarize them, with any new assignments ignored.
        if unreported {
            stream.emit(AgentEvent::Status(format!(
                "Team stopped after {} rounds",
                self.max_rounds
            )));
            transcript.push(Message::user(prompts::TEAM_WRAP_UP));
            stream.emit(AgentEvent::AgentStarted {
                agent: coordinator.name().to_string(),
            });
            let output = coordinator
                .run_turn(
                    &mut transcript,
                    &session.tools,
                    &ToolScope::None,
                    cancel,
                    |e| stream.emit(e),
                )
                .await?;
            usage.add(&output.usage);
            answer = output.text;
        }

        let answer = answer.replace(TERMINATE, "").trim().to_string();
        if !answer.is_empty() {
            session.conversation.push(Message::assistant(answer));
        }
        Ok(usage)
    }
}
