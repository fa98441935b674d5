//! Tool call envelope issued by the orchestrator.

use serde::{Deserialize, Serialize};

use crate::llm;

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates the call with its response; unique per agent turn.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Serialized parameters, normally a JSON object matching the tool's schema.
    pub input: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input: input.into(),
        }
    }
}

impl From<&llm::ToolCall> for ToolCall {
    fn from(tc: &llm::ToolCall) -> Self {
        Self {
            id: tc.id.clone(),
            name: tc.function.name.clone(),
            input: tc.function.arguments.clone(),
        }
    }
}
