//! agent tool: general-purpose sub-agent for self-contained searches and tasks.

use serde::Deserialize;

use crate::tools::delegate::{DelegateTask, DelegateTool, require_text, session_title};
use crate::tools::info::ToolInfo;

pub type AgentTool = DelegateTool<AgentParams>;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentParams {
    pub prompt: String,
}

impl DelegateTask for AgentParams {
    const NAME: &'static str = "agent";

    fn info() -> ToolInfo {
        ToolInfo::new(
            Self::NAME,
            "Launch a new agent with a subset of tools to carry out a self-contained task, \
             such as searching the workspace for a symbol or reading several files to answer a question. \
             The agent cannot launch further agents; its final answer is returned as this tool's result.",
        )
        .param(
            "prompt",
            "string",
            "The task for the agent to perform; include every detail it needs",
            true,
        )
    }

    fn validate(&self) -> Result<(), String> {
        require_text("prompt", &self.prompt)
    }

    fn title(&self) -> String {
        session_title("Agent", &self.prompt)
    }

    fn compose(&self) -> String {
        self.prompt.trim().to_string()
    }
}
