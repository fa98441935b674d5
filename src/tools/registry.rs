//! Register tools by name; resolve and dispatch calls under a dispatch policy.
//!
//! A registry is built once and then shared read-only (`Arc<ToolRegistry>`);
//! concurrent dispatch needs no locking.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub use crate::BoxFuture;
use crate::config::Config;
use crate::llm::ToolDef;
use crate::tools::call::ToolCall;
use crate::tools::context::ToolCtx;
use crate::tools::error::{RegistryError, ToolError};
use crate::tools::info::ToolInfo;
use crate::tools::result::ToolResponse;

/// How long a stopped delegation may take to wind down before it is dropped.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

enum Stop {
    Cancelled,
    TimedOut,
}

/// A single tool: name, schema, and the one effectful entry point.
pub trait Tool: Send + Sync {
    /// Registry key; constant for the tool's lifetime.
    fn name(&self) -> &str;

    /// Descriptor advertised to the model.
    fn info(&self) -> ToolInfo;

    /// True for tools that spawn nested agent runs. Child registries
    /// never contain such tools.
    fn delegates(&self) -> bool {
        false
    }

    /// Parse `call.input`, perform the effect, respond.
    ///
    /// Malformed input is `Ok(ToolResponse::error(..))`; `Err` is reserved
    /// for wiring defects such as a missing call context.
    fn run<'a>(
        &'a self,
        ctx: &'a ToolCtx,
        call: &'a ToolCall,
    ) -> BoxFuture<'a, Result<ToolResponse, ToolError>>;
}

/// Deserialize tool input; an empty payload is treated as `{}`.
pub fn parse_params<P: DeserializeOwned>(input: &str) -> Result<P, ToolResponse> {
    let input = if input.trim().is_empty() { "{}" } else { input };
    serde_json::from_str(input)
        .map_err(|e| ToolResponse::error(format!("error parsing parameters: {e}")))
}

/// Time limits applied by the dispatcher. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchPolicy {
    pub timeout: Option<Duration>,
    pub delegation_timeout: Option<Duration>,
}

impl DispatchPolicy {
    pub fn from_config(config: &Config) -> Self {
        let dispatch = config.dispatch.as_ref();
        let secs = |v: Option<u64>| v.filter(|s| *s > 0).map(Duration::from_secs);
        Self {
            timeout: secs(dispatch.and_then(|d| d.timeout_secs)),
            delegation_timeout: secs(dispatch.and_then(|d| d.delegation_timeout_secs)),
        }
    }

    fn limit_for(&self, tool: &dyn Tool) -> Option<Duration> {
        if tool.delegates() {
            self.delegation_timeout
        } else {
            self.timeout
        }
    }
}

/// Outcome of one call in a batch, tagged with its call id.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub call_id: String,
    pub result: Result<ToolResponse, ToolError>,
}

/// Registry of tools by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    policy: DispatchPolicy,
}

impl ToolRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[inline]
    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Register a tool under its name. Rejects duplicates and schemas that
    /// disagree with the tool.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        validate_info(&name, &tool.info())?;
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// True if any registered tool spawns nested runs.
    pub fn has_delegation(&self) -> bool {
        self.tools.values().any(|t| t.delegates())
    }

    /// Execute one call. Unknown tool is a hard failure; panics, timeouts and
    /// cancellation inside the tool become error responses.
    pub async fn dispatch(&self, ctx: &ToolCtx, call: &ToolCall) -> Result<ToolResponse, ToolError> {
        let tool = self.resolve(&call.name)?;
        let call_ctx = ctx.derive();
        let limit = self.policy.limit_for(tool.as_ref());
        debug!(tool = %call.name, call_id = %call.id, "dispatching tool call");

        let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| tool.run(&call_ctx, call))) {
            Ok(f) => f,
            Err(payload) => return Ok(panic_response(&call.name, payload)),
        };
        let mut guarded = AssertUnwindSafe(fut).catch_unwind();
        let deadline = async {
            match limit {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let stop = tokio::select! {
            biased;
            _ = call_ctx.cancellation().cancelled() => Stop::Cancelled,
            _ = &mut deadline => Stop::TimedOut,
            outcome = &mut guarded => {
                return match outcome {
                    Ok(result) => result,
                    Err(payload) => Ok(panic_response(&call.name, payload)),
                };
            }
        };

        if tool.delegates() {
            // Let the nested run observe cancellation and settle its usage.
            call_ctx.cancellation().cancel();
            if tokio::time::timeout(DRAIN_GRACE, &mut guarded).await.is_err() {
                warn!(tool = %call.name, call_id = %call.id, "delegation did not settle after cancellation");
            }
        }

        match stop {
            Stop::Cancelled => {
                debug!(tool = %call.name, call_id = %call.id, "tool call cancelled");
                Ok(ToolResponse::error(format!("tool '{}' cancelled", call.name)))
            }
            Stop::TimedOut => {
                warn!(tool = %call.name, call_id = %call.id, "tool call timed out");
                let secs = limit.map(|d| d.as_secs()).unwrap_or_default();
                Ok(ToolResponse::error(format!(
                    "tool '{}' timed out after {secs}s",
                    call.name
                )))
            }
        }
    }

    /// Execute sibling calls concurrently. One outcome per call, in input order.
    pub async fn dispatch_all(&self, ctx: &ToolCtx, calls: &[ToolCall]) -> Vec<DispatchOutcome> {
        join_all(calls.iter().map(|call| async move {
            DispatchOutcome {
                call_id: call.id.clone(),
                result: self.dispatch(ctx, call).await,
            }
        }))
        .await
    }

    /// Schemas advertised to the model, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self.tools.values().map(|t| t.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// All tool definitions for the LLM.
    pub fn to_tool_defs(&self) -> Vec<ToolDef> {
        self.list_tools().iter().map(ToolInfo::to_tool_def).collect()
    }

    /// Sorted list of tool names.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Short summaries: "name - description" per tool, sorted by name.
    pub fn summaries(&self) -> Vec<String> {
        self.list_tools()
            .into_iter()
            .map(|i| format!("{} - {}", i.name, i.description))
            .collect()
    }

    /// Sub-registry holding only `names` (unknown names are skipped).
    pub fn restricted(&self, names: &[&str]) -> ToolRegistry {
        let tools = names
            .iter()
            .filter_map(|n| self.tools.get(*n).map(|t| (n.to_string(), Arc::clone(t))))
            .collect();
        ToolRegistry {
            tools,
            policy: self.policy,
        }
    }

    /// Sub-registry with every delegating tool removed.
    pub fn without_delegation(&self) -> ToolRegistry {
        let tools = self
            .tools
            .iter()
            .filter(|(_, t)| !t.delegates())
            .map(|(n, t)| (n.clone(), Arc::clone(t)))
            .collect();
        ToolRegistry {
            tools,
            policy: self.policy,
        }
    }
}

fn validate_info(name: &str, info: &ToolInfo) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidSchema {
        tool: name.to_string(),
        reason,
    };
    if name.trim().is_empty() {
        return Err(invalid("empty name".into()));
    }
    if info.name != name {
        return Err(invalid(format!("info names '{}'", info.name)));
    }
    let missing = info.undeclared_required();
    if !missing.is_empty() {
        return Err(invalid(format!(
            "required parameters not declared: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

fn panic_response(tool: &str, payload: Box<dyn Any + Send>) -> ToolResponse {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    warn!(tool, panic = %msg, "tool panicked");
    ToolResponse::error(format!("tool '{tool}' failed unexpectedly: {msg}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::CallContext;

    struct Echo;

    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn info(&self) -> ToolInfo {
            ToolInfo::new("echo", "Echo text back").param("text", "string", "Text", true)
        }

        fn run<'a>(
            &'a self,
            _ctx: &'a ToolCtx,
            call: &'a ToolCall,
        ) -> BoxFuture<'a, Result<ToolResponse, ToolError>> {
            Box::pin(async move {
                #[derive(serde::Deserialize)]
                struct P {
                    text: String,
                }
                let p: P = match parse_params(&call.input) {
                    Ok(p) => p,
                    Err(resp) => return Ok(resp),
                };
                Ok(ToolResponse::text(p.text))
            })
        }
    }

    struct Panics;

    impl Tool for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn info(&self) -> ToolInfo {
            ToolInfo::new("panics", "Always panics")
        }

        fn run<'a>(
            &'a self,
            _ctx: &'a ToolCtx,
            _call: &'a ToolCall,
        ) -> BoxFuture<'a, Result<ToolResponse, ToolError>> {
            Box::pin(async move { panic!("boom") })
        }
    }

    struct Sleeps;

    impl Tool for Sleeps {
        fn name(&self) -> &str {
            "sleeps"
        }

        fn info(&self) -> ToolInfo {
            ToolInfo::new("sleeps", "Sleeps for a minute")
        }

        fn run<'a>(
            &'a self,
            _ctx: &'a ToolCtx,
            _call: &'a ToolCall,
        ) -> BoxFuture<'a, Result<ToolResponse, ToolError>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(ToolResponse::text("woke"))
            })
        }
    }

    /// Delegating tool that records whether it saw its context cancelled.
    struct Winds {
        settled: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Tool for Winds {
        fn name(&self) -> &str {
            "winds"
        }

        fn info(&self) -> ToolInfo {
            ToolInfo::new("winds", "Runs until cancelled")
        }

        fn delegates(&self) -> bool {
            true
        }

        fn run<'a>(
            &'a self,
            ctx: &'a ToolCtx,
            _call: &'a ToolCall,
        ) -> BoxFuture<'a, Result<ToolResponse, ToolError>> {
            Box::pin(async move {
                ctx.cancellation().cancelled().await;
                self.settled.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(ToolResponse::error("stopped"))
            })
        }
    }

    struct Mislabelled;

    impl Tool for Mislabelled {
        fn name(&self) -> &str {
            "a"
        }

        fn info(&self) -> ToolInfo {
            ToolInfo::new("b", "wrong name")
        }

        fn run<'a>(
            &'a self,
            _ctx: &'a ToolCtx,
            _call: &'a ToolCall,
        ) -> BoxFuture<'a, Result<ToolResponse, ToolError>> {
            Box::pin(async move { Ok(ToolResponse::text("")) })
        }
    }

    fn ctx() -> ToolCtx {
        ToolCtx::new(std::env::temp_dir(), true)
            .with_identity(CallContext::new("s1", "m1").unwrap())
    }

    #[tokio::test]
    async fn registry_register_dispatch_and_defs() {
        let mut reg = ToolRegistry::new();
        reg.register(Echo).unwrap();
        assert_eq!(reg.list(), vec!["echo".to_string()]);
        let defs = reg.to_tool_defs();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].function.name, "echo");
        assert!(reg.summaries()[0].starts_with("echo - "));

        let res = reg
            .dispatch(&ctx(), &ToolCall::new("c1", "echo", r#"{"text":"hi"}"#))
            .await
            .unwrap();
        assert!(!res.is_error);
        assert_eq!(res.content, "hi");
    }

    #[tokio::test]
    async fn missing_required_field_is_response_error() {
        let mut reg = ToolRegistry::new();
        reg.register(Echo).unwrap();
        let res = reg
            .dispatch(&ctx(), &ToolCall::new("c1", "echo", "{}"))
            .await
            .unwrap();
        assert!(res.is_error);
        assert!(res.content.contains("text"));

        let res = reg
            .dispatch(&ctx(), &ToolCall::new("c2", "echo", "not json"))
            .await
            .unwrap();
        assert!(res.is_error);
        assert!(res.content.starts_with("error parsing parameters"));
    }

    #[tokio::test]
    async fn unknown_tool_is_hard_failure() {
        let mut reg = ToolRegistry::new();
        reg.register(Echo).unwrap();
        for input in ["{}", r#"{"text":"x"}"#, "garbage"] {
            let err = reg
                .dispatch(&ctx(), &ToolCall::new("c1", "nope", input))
                .await
                .unwrap_err();
            assert_eq!(err, ToolError::UnknownTool("nope".into()));
        }
    }

    #[test]
    fn duplicate_and_mismatched_names_rejected() {
        let mut reg = ToolRegistry::new();
        reg.register(Echo).unwrap();
        assert_eq!(
            reg.register(Echo).unwrap_err(),
            RegistryError::Duplicate("echo".into())
        );
        assert!(matches!(
            reg.register(Mislabelled),
            Err(RegistryError::InvalidSchema { .. })
        ));
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn panic_in_tool_becomes_error_response() {
        let mut reg = ToolRegistry::new();
        reg.register(Panics).unwrap();
        let res = reg
            .dispatch(&ctx(), &ToolCall::new("c1", "panics", "{}"))
            .await
            .unwrap();
        assert!(res.is_error);
        assert!(res.content.contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_from_policy_becomes_error_response() {
        let mut reg = ToolRegistry::new().with_policy(DispatchPolicy {
            timeout: Some(Duration::from_secs(5)),
            delegation_timeout: None,
        });
        reg.register(Sleeps).unwrap();
        let res = reg
            .dispatch(&ctx(), &ToolCall::new("c1", "sleeps", ""))
            .await
            .unwrap();
        assert!(res.is_error);
        assert!(res.content.contains("timed out after 5s"));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_delegation_observes_cancellation() {
        let settled = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut reg = ToolRegistry::new().with_policy(DispatchPolicy {
            timeout: None,
            delegation_timeout: Some(Duration::from_secs(5)),
        });
        reg.register(Winds {
            settled: settled.clone(),
        })
        .unwrap();
        let res = reg
            .dispatch(&ctx(), &ToolCall::new("c1", "winds", ""))
            .await
            .unwrap();
        assert!(res.content.contains("timed out after 5s"));
        assert!(settled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancelled_context_resolves_call() {
        let mut reg = ToolRegistry::new();
        reg.register(Sleeps).unwrap();
        let ctx = ctx();
        let cancel = ctx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        let res = tokio::time::timeout(
            Duration::from_secs(5),
            reg.dispatch(&ctx, &ToolCall::new("c1", "sleeps", "")),
        )
        .await
        .expect("dispatch must resolve after cancel")
        .unwrap();
        assert!(res.is_error);
        assert!(res.content.contains("cancelled"));
    }

    #[tokio::test]
    async fn dispatch_all_keeps_call_ids() {
        let mut reg = ToolRegistry::new();
        reg.register(Echo).unwrap();
        let calls = vec![
            ToolCall::new("a", "echo", r#"{"text":"one"}"#),
            ToolCall::new("b", "missing", "{}"),
            ToolCall::new("c", "echo", r#"{"text":"three"}"#),
        ];
        let out = reg.dispatch_all(&ctx(), &calls).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].call_id, "a");
        assert_eq!(out[0].result.as_ref().unwrap().content, "one");
        assert!(matches!(out[1].result, Err(ToolError::UnknownTool(_))));
        assert_eq!(out[2].call_id, "c");
        assert_eq!(out[2].result.as_ref().unwrap().content, "three");
    }

    #[test]
    fn list_tools_is_idempotent_and_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register(Sleeps).unwrap();
        reg.register(Echo).unwrap();
        let first = reg.list_tools();
        assert_eq!(first, reg.list_tools());
        assert_eq!(first[0].name, "echo");
        assert_eq!(first[1].name, "sleeps");
    }

    #[test]
    fn restricted_is_subset() {
        let mut reg = ToolRegistry::new();
        reg.register(Sleeps).unwrap();
        reg.register(Echo).unwrap();
        let sub = reg.restricted(&["echo", "ghost"]);
        assert_eq!(sub.list(), vec!["echo".to_string()]);
        assert!(!sub.has_delegation());
        assert_eq!(reg.without_delegation().len(), 2);
    }
}
