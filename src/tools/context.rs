//! Execution context for tools: conversation identity, cancellation, workspace.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::tools::error::ToolError;

/// Identity of the conversation turn that issued a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallContext {
    session_id: String,
    message_id: String,
}

impl CallContext {
    /// Both ids must be non-empty (after trimming).
    pub fn new(session_id: impl Into<String>, message_id: impl Into<String>) -> Option<Self> {
        let session_id = session_id.into();
        let message_id = message_id.into();
        if session_id.trim().is_empty() || message_id.trim().is_empty() {
            return None;
        }
        Some(Self {
            session_id,
            message_id,
        })
    }

    #[inline]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[inline]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }
}

/// Context passed into each tool execution. Immutable; derive a new one
/// per call instead of mutating.
#[derive(Debug, Clone)]
pub struct ToolCtx {
    identity: Option<CallContext>,
    cancel: CancellationToken,
    /// Workspace root for file tools.
    pub workspace: PathBuf,
    /// If true, reject paths outside workspace (e.g. `..`).
    pub restrict_to_workspace: bool,
}

impl ToolCtx {
    /// Root context with no identity and a fresh cancellation token.
    pub fn new(workspace: impl Into<PathBuf>, restrict_to_workspace: bool) -> Self {
        Self {
            identity: None,
            cancel: CancellationToken::new(),
            workspace: workspace.into(),
            restrict_to_workspace,
        }
    }

    /// Same context under an existing cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Copy of this context bound to `identity`.
    pub fn with_identity(&self, identity: CallContext) -> Self {
        Self {
            identity: Some(identity),
            ..self.clone()
        }
    }

    /// Per-call context: same identity, child cancellation token.
    /// Cancelling `self` cancels the derived context, not the reverse.
    pub fn derive(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            cancel: self.cancel.child_token(),
            workspace: self.workspace.clone(),
            restrict_to_workspace: self.restrict_to_workspace,
        }
    }

    #[inline]
    pub fn call_context(&self) -> Option<&CallContext> {
        self.identity.as_ref()
    }

    /// Identity or `MissingContext`; for tools that attribute history or spawn children.
    pub fn require_identity(&self) -> Result<&CallContext, ToolError> {
        self.identity
            .as_ref()
            .ok_or(ToolError::MissingContext("session_id and message_id are required"))
    }

    #[inline]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// `(session_id, message_id)` bound to `ctx`, if any.
pub fn context_values(ctx: &ToolCtx) -> (Option<&str>, Option<&str>) {
    match ctx.call_context() {
        Some(id) => (Some(id.session_id()), Some(id.message_id())),
        None => (None, None),
    }
}
