use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown mode '{0}' (expected single, pipeline or team)")]
pub struct ModeParseError(pub String);
