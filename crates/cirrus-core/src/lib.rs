//! Agent loop, conversation state and orchestration modes for Cirrus.

mod agent;
mod conversation;
mod driver;
mod error;
mod pipeline;
pub mod prompts;
mod team;

pub use agent::{Agent, AgentEvent, AgentSettings, DEFAULT_MAX_TOOL_ROUNDS, TurnOutput};
pub use conversation::{Conversation, Session};
pub use driver::{Driver, Mode};
pub use error::ModeParseError;
pub use pipeline::{Pipeline, TaskType};
pub use team::{Assignment, Team, parse_assignments};
