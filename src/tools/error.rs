//! Hard failures of dispatch and registry construction.

use thiserror::Error;

/// A failure that aborts a dispatch and is surfaced to the orchestrator,
/// never shown to the model as a tool response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// The requested name is not in the registry.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The call context lacks identity the tool requires.
    #[error("call context missing: {0}")]
    MissingContext(&'static str),

    /// A collaborator the tool depends on is unusable.
    #[error("dependency failure: {0}")]
    Dependency(String),
}

/// Registry construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate tool name: {0}")]
    Duplicate(String),

    #[error("tool '{tool}' has invalid schema: {reason}")]
    InvalidSchema { tool: String, reason: String },
}
