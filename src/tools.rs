//! Tool contract, registry/dispatcher, and implementations: file and fetch
//! leaf tools plus the architect, debugger and agent delegation tools.

pub mod agent;
pub mod architect;
pub mod call;
pub mod context;
pub mod debugger;
pub mod delegate;
pub mod error;
pub mod fetch;
pub mod file;
pub mod info;
pub mod registry;
pub mod result;

use std::sync::Arc;

use crate::agent::SubagentManager;
use crate::config::Config;

pub use agent::AgentTool;
pub use architect::ArchitectTool;
pub use call::ToolCall;
pub use context::{CallContext, ToolCtx, context_values};
pub use debugger::DebuggerTool;
pub use delegate::{DelegateTask, DelegateTool};
pub use error::{RegistryError, ToolError};
pub use info::ToolInfo;
pub use registry::{DispatchOutcome, DispatchPolicy, Tool, ToolRegistry};
pub use result::ToolResponse;

/// Leaf tools only: view, ls, write, edit, fetch. Used as the child registry
/// of every sub-agent run.
pub fn build_leaf_registry(config: &Config) -> Result<ToolRegistry, RegistryError> {
    let mut reg = ToolRegistry::new().with_policy(DispatchPolicy::from_config(config));
    reg.register(file::ViewTool)?;
    reg.register(file::LsTool)?;
    reg.register(file::WriteTool)?;
    reg.register(file::EditTool)?;

    let max_chars = config
        .tools
        .as_ref()
        .and_then(|t| t.fetch_max_chars)
        .unwrap_or(fetch::DEFAULT_MAX_CHARS);
    match fetch::web_client() {
        Ok(client) => reg.register(fetch::FetchTool::new(client, max_chars))?,
        Err(e) => tracing::warn!(error = %e, "http client unavailable, fetch tool disabled"),
    }
    Ok(reg)
}

/// Leaf tools plus the delegation tools backed by `manager`.
pub fn build_agent_registry(
    config: &Config,
    manager: Arc<SubagentManager>,
) -> Result<ToolRegistry, RegistryError> {
    let mut reg = build_leaf_registry(config)?;
    reg.register(ArchitectTool::new(Arc::clone(&manager)))?;
    reg.register(DebuggerTool::new(Arc::clone(&manager)))?;
    reg.register(AgentTool::new(manager))?;
    Ok(reg)
}
