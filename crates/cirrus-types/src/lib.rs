//! Shared types and error hierarchy for Cirrus.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod util;

pub use error::{ApiError, CirrusError, ConfigError, ToolError};
pub use message::*;
pub use tool::*;
pub use util::truncate_for_display;
