//! debugger tool: delegate root-cause analysis of an error to a sub-agent.

use serde::Deserialize;

use crate::tools::delegate::{DelegateTask, DelegateTool, push_section, require_text, session_title};
use crate::tools::info::ToolInfo;

pub type DebuggerTool = DelegateTool<DebuggerParams>;

#[derive(Debug, Clone, Deserialize)]
pub struct DebuggerParams {
    pub error: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
}

impl DelegateTask for DebuggerParams {
    const NAME: &'static str = "debugger";

    fn info() -> ToolInfo {
        ToolInfo::new(
            Self::NAME,
            "Launch a specialized debugging agent to analyze and fix code errors. \
             Use this tool when you encounter errors in code execution or need to debug specific issues.",
        )
        .param("error", "string", "The error message or issue to debug", true)
        .param(
            "context",
            "string",
            "Additional context about the error, such as what operation was being performed",
            false,
        )
        .param("file", "string", "The file where the error occurred, if known", false)
    }

    fn validate(&self) -> Result<(), String> {
        require_text("error", &self.error)
    }

    fn title(&self) -> String {
        session_title("Debug", &self.error)
    }

    fn compose(&self) -> String {
        let mut prompt = String::from("Debug the following error:");
        push_section(&mut prompt, "Error", Some(&self.error));
        push_section(&mut prompt, "Context", self.context.as_deref());
        push_section(&mut prompt, "File", self.file.as_deref());
        prompt.push_str(
            "\n\nPlease analyze the error, identify the root cause, and provide a solution to fix it.",
        );
        prompt
    }
}
