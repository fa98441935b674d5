//! Tool response envelope: content for the model, error flag, optional metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of executing a tool call.
///
/// `is_error` marks a problem the model should see and adapt to (bad input,
/// a failed effect, a failed sub-agent). Wiring defects are not responses;
/// they surface as [`ToolError`](crate::tools::ToolError).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Text appended to the conversation for the model.
    pub content: String,
    /// True when the tool ran and reported a problem.
    pub is_error: bool,
    /// Attached artifacts (e.g. child session id of a delegated run).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<Value>,
}

impl ToolResponse {
    /// Success: text content only.
    #[inline]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            metadata: None,
        }
    }

    /// Error: content = msg, is_error = true.
    #[inline]
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            content: msg.into(),
            is_error: true,
            metadata: None,
        }
    }

    #[inline]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
