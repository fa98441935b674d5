//! Delegation tools: validate parameters, compose a task prompt, run it as a
//! nested agent in a child session and return the final answer.
//!
//! Each specialised tool is a `DelegateTask` parameter type; `DelegateTool`
//! supplies the shared run logic. Any failure past binding (session store,
//! sub-agent run, cancellation) is reported to the model as an error response.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::warn;

use crate::agent::SubagentManager;
use crate::tools::call::ToolCall;
use crate::tools::context::ToolCtx;
use crate::tools::error::ToolError;
use crate::tools::info::ToolInfo;
use crate::tools::registry::{BoxFuture, Tool, parse_params};
use crate::tools::result::ToolResponse;

const TITLE_MAX_CHARS: usize = 60;

/// Parameters of one delegation tool and how they become a sub-agent task.
pub trait DelegateTask: DeserializeOwned + Send {
    /// Registry name of the tool.
    const NAME: &'static str;

    fn info() -> ToolInfo;

    /// Reject semantically empty input before any session is created.
    fn validate(&self) -> Result<(), String>;

    /// Child session title.
    fn title(&self) -> String;

    /// Prompt handed to the sub-agent.
    fn compose(&self) -> String;
}

/// A tool that runs `P`'s task in a nested agent.
pub struct DelegateTool<P> {
    manager: Arc<SubagentManager>,
    _params: PhantomData<fn() -> P>,
}

impl<P> DelegateTool<P> {
    #[inline]
    pub fn new(manager: Arc<SubagentManager>) -> Self {
        Self {
            manager,
            _params: PhantomData,
        }
    }
}

impl<P: DelegateTask + 'static> Tool for DelegateTool<P> {
    fn name(&self) -> &str {
        P::NAME
    }

    fn info(&self) -> ToolInfo {
        P::info()
    }

    fn delegates(&self) -> bool {
        true
    }

    fn run<'a>(
        &'a self,
        ctx: &'a ToolCtx,
        call: &'a ToolCall,
    ) -> BoxFuture<'a, Result<ToolResponse, ToolError>> {
        Box::pin(async move {
            let params: P = match parse_params(&call.input) {
                Ok(p) => p,
                Err(resp) => return Ok(resp),
            };
            if let Err(msg) = params.validate() {
                return Ok(ToolResponse::error(msg));
            }
            let parent = ctx.require_identity()?;
            let title = params.title();
            let task = params.compose();
            drop(params);

            match self.manager.delegate(ctx, parent, P::NAME, title, task).await {
                Ok(out) => Ok(ToolResponse::text(out.answer).with_metadata(json!({
                    "agent": P::NAME,
                    "session_id": out.session_id,
                    "run_id": out.run_id,
                }))),
                Err(e) => {
                    warn!(tool = P::NAME, call_id = %call.id, error = %e, "delegation failed");
                    Ok(ToolResponse::error(format!("{} agent failed: {e}", P::NAME)))
                }
            }
        })
    }
}

/// `"{prefix}: {text}"`, with `text` cut to a short single line.
pub fn session_title(prefix: &str, text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    let mut short: String = line.chars().take(TITLE_MAX_CHARS).collect();
    if line.chars().count() > TITLE_MAX_CHARS {
        short.push_str("...");
    }
    format!("{prefix}: {short}")
}

/// Error message for a required text field that is missing its content.
pub fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} is required"))
    } else {
        Ok(())
    }
}

/// Append `"\n\n{label}: {value}"` when `value` has content.
pub fn push_section(prompt: &mut String, label: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(v);
    }
}
