//! architect tool: delegate a design task to a sub-agent.

use serde::Deserialize;

use crate::tools::delegate::{DelegateTask, DelegateTool, push_section, require_text, session_title};
use crate::tools::info::ToolInfo;

pub type ArchitectTool = DelegateTool<ArchitectParams>;

#[derive(Debug, Clone, Deserialize)]
pub struct ArchitectParams {
    pub requirement: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub existing: Option<String>,
}

impl DelegateTask for ArchitectParams {
    const NAME: &'static str = "architect";

    fn info() -> ToolInfo {
        ToolInfo::new(
            Self::NAME,
            "Launch a specialized architecture agent to design software solutions and systems. \
             Use this tool when you need to plan complex features, design system architectures, \
             or create technical specifications.",
        )
        .param(
            "requirement",
            "string",
            "The architectural requirement or feature to design",
            true,
        )
        .param(
            "context",
            "string",
            "Additional context about the project or system",
            false,
        )
        .param(
            "existing",
            "string",
            "Description of existing systems or components that need to be integrated",
            false,
        )
    }

    fn validate(&self) -> Result<(), String> {
        require_text("requirement", &self.requirement)
    }

    fn title(&self) -> String {
        session_title("Architect", &self.requirement)
    }

    fn compose(&self) -> String {
        let mut prompt = String::from("Design an architecture for the following requirement:");
        push_section(&mut prompt, "Requirement", Some(&self.requirement));
        push_section(&mut prompt, "Context", self.context.as_deref());
        push_section(&mut prompt, "Existing", self.existing.as_deref());
        prompt.push_str(
            "\n\nPlease create a detailed technical design including components, interactions, \
             data flow, and implementation considerations.",
        );
        prompt
    }
}
