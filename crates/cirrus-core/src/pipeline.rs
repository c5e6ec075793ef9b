//! Pipeline mode: classify the request, hand it to a specialist, and
//! synthesize when more than one specialist answered.

use std::fmt;
use std::sync::Arc;

use cirrus_tools::{Catalog, ToolScope, classify};
use cirrus_types::{CirrusError, Message, Usage, provider::Provider};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentEvent, AgentSettings};
use crate::conversation::Session;
use crate::driver::activate_for_specialist;
use crate::prompts;

/// Temperature for the classifier and the synthesizer.
const ROUTING_TEMPERATURE: f32 = 0.1;

/// The route a request takes through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    AzureInfrastructure,
    GithubOperations,
    CrossPlatform,
    GeneralInquiry,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::AzureInfrastructure => "azure_infrastructure",
            TaskType::GithubOperations => "github_operations",
            TaskType::CrossPlatform => "cross_platform",
            TaskType::GeneralInquiry => "general_inquiry",
        }
    }

    /// Interpret the classifier's reply. Anything unrecognized is a general
    /// inquiry.
    pub fn from_reply(reply: &str) -> Self {
        let reply = reply.trim().to_ascii_uppercase();
        if reply.contains("CROSS") {
            TaskType::CrossPlatform
        } else if reply.contains("AZURE") {
            TaskType::AzureInfrastructure
        } else if reply.contains("GITHUB") {
            TaskType::GithubOperations
        } else {
            TaskType::GeneralInquiry
        }
    }

    /// Classify from category keywords alone.
    pub fn from_keywords(catalog: &Catalog, text: &str) -> Self {
        let matches = classify(catalog, text);
        let azure = matches.iter().any(|m| m.category.name == "azure");
        let github = matches.iter().any(|m| m.category.name == "github");
        match (azure, github) {
            (true, true) => TaskType::CrossPlatform,
            (true, false) => TaskType::AzureInfrastructure,
            (false, true) => TaskType::GithubOperations,
            (false, false) => TaskType::GeneralInquiry,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed classifier, specialist and synthesis pipeline.
pub struct Pipeline {
    classifier: Agent,
    orchestrator: Agent,
    synthesizer: Agent,
    azure: Agent,
    github: Agent,
}

impl Pipeline {
    pub fn new(provider: Arc<dyn Provider>, settings: AgentSettings) -> Self {
        let agent = |name: &str, prompt: &str| {
            Agent::new(name, Arc::clone(&provider), settings.clone()).with_system_prompt(prompt)
        };
        Self {
            classifier: agent("Classifier", prompts::CLASSIFIER)
                .with_temperature(Some(ROUTING_TEMPERATURE)),
            orchestrator: agent("Orchestrator", prompts::ORCHESTRATOR),
            synthesizer: agent("Synthesizer", prompts::SYNTHESIZER)
                .with_temperature(Some(ROUTING_TEMPERATURE)),
            azure: agent("AzureAgent", prompts::AZURE_SPECIALIST),
            github: agent("GitHubAgent", prompts::GITHUB_SPECIALIST),
        }
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
        let mut usage = Usage::default();
        let task = self.classify(session, prompt, cancel, &mut usage).await?;
        tracing::info!(session = %session.id(), %task, "Routing request");
        on_event(AgentEvent::Status(format!("Request classified as {task}")));

        session.conversation.push(Message::user(prompt));
        match task {
            TaskType::AzureInfrastructure => {
                self.run_specialist(&self.azure, "azure", session, cancel, on_event, &mut usage)
                    .await?;
            }
            TaskType::GithubOperations => {
                self.run_specialist(&self.github, "github", session, cancel, on_event, &mut usage)
                    .await?;
            }
            TaskType::CrossPlatform => {
                self.cross_platform(session, prompt, cancel, on_event, &mut usage)
                    .await?;
            }
            TaskType::GeneralInquiry => {
                on_event(AgentEvent::AgentStarted {
                    agent: self.orchestrator.name().to_string(),
                });
                let output = self
                    .orchestrator
                    .run_turn(
                        &mut session.conversation.messages,
                        &session.tools,
                        &ToolScope::None,
                        cancel,
                        &mut *on_event,
                    )
                    .await?;
                usage.add(&output.usage);
            }
        }
        Ok(usage)
    }

    /// Ask the classifier model, falling back to keywords when the call
    /// fails.
    async fn classify(
        &self,
        session: &Session,
        prompt: &str,
        cancel: &CancellationToken,
        usage: &mut Usage,
    ) -> Result<TaskType, CirrusError> {
        let mut messages = vec![Message::user(prompts::classification_request(prompt))];
        let result = self
            .classifier
            .run_turn(&mut messages, &session.tools, &ToolScope::None, cancel, |_| {})
            .await;
        match result {
            Ok(output) => {
                usage.add(&output.usage);
                tracing::debug!(reply = %output.text.trim(), "Classifier replied");
                Ok(TaskType::from_reply(&output.text))
            }
            Err(CirrusError::Cancelled) => Err(CirrusError::Cancelled),
            Err(e) => {
                tracing::warn!("Classification failed, using keywords: {e}");
                Ok(TaskType::from_keywords(session.tools.catalog(), prompt))
            }
        }
    }

    async fn run_specialist<F>(
        &self,
        agent: &Agent,
        category: &str,
        session: &mut Session,
        cancel: &CancellationToken,
        on_event: &mut F,
        usage: &mut Usage,
    ) -> Result<(), CirrusError>
    where
        F: FnMut(AgentEvent),
    {
        on_event(AgentEvent::AgentStarted {
            agent: agent.name().to_string(),
        });
        activate_for_specialist(&mut session.tools, &[category], cancel, on_event).await?;
        let output = agent
            .run_turn(
                &mut session.conversation.messages,
                &session.tools,
                &ToolScope::only(category),
                cancel,
                &mut *on_event,
            )
            .await?;
        usage.add(&output.usage);
        Ok(())
    }

    /// Run both specialists on private copies of the history, then merge
    /// their answers. Only the merged answer is streamed as text.
    async fn cross_platform<F>(
        &self,
        session: &mut Session,
        prompt: &str,
        cancel: &CancellationToken,
        on_event: &mut F,
        usage: &mut Usage,
    ) -> Result<(), CirrusError>
    where
        F: FnMut(AgentEvent),
    {
        let mut answers = Vec::with_capacity(2);
        for (agent, category) in [(&self.azure, "azure"), (&self.github, "github")] {
            on_event(AgentEvent::AgentStarted {
                agent: agent.name().to_string(),
            });
            activate_for_specialist(&mut session.tools, &[category], cancel, on_event).await?;

            let mut scratch = session.conversation.messages.clone();
            let output = agent
                .run_turn(
                    &mut scratch,
                    &session.tools,
                    &ToolScope::only(category),
                    cancel,
                    |event| {
                        if !matches!(event, AgentEvent::TextDelta(_)) {
                            on_event(event);
                        }
                    },
                )
                .await?;
            usage.add(&output.usage);
            answers.push(output.text);
        }
        let (azure, github) = (&answers[0], &answers[1]);

        on_event(AgentEvent::AgentStarted {
            agent: self.synthesizer.name().to_string(),
        });
        let mut messages = vec![Message::user(prompts::synthesis_request(
            azure, github, prompt,
        ))];
        let result = self
            .synthesizer
            .run_turn(
                &mut messages,
                &session.tools,
                &ToolScope::None,
                cancel,
                &mut *on_event,
            )
            .await;
        let answer = match result {
            Ok(output) => {
                usage.add(&output.usage);
                output.text
            }
            Err(CirrusError::Cancelled) => return Err(CirrusError::Cancelled),
            Err(e) => {
                tracing::error!("Cross-platform synthesis failed: {e}");
                let combined = format!("Azure Response:\n{azure}\n\nGitHub Response:\n{github}");
                on_event(AgentEvent::TextDelta(combined.clone()));
                combined
            }
        };
        session.conversation.push(Message::assistant(answer));
        Ok(())
    }
}
