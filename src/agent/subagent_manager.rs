//! SubagentManager: runs nested agent tasks for delegation tools, with stable
//! run IDs, cancellation, usage rollup and bounded pruning of finished runs.
//!
//! A single `Arc<SubagentManager>` is shared by every delegation tool.
//! Interior mutability via `RwLock`; lock scopes kept short.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{AgentError, TaskExecutor};
use crate::session::{NewSession, SessionService, StoreError, Usage};
use crate::tools::{CallContext, ToolCtx, ToolRegistry};

const MAX_COMPLETED_RUNS: usize = 50;

/// Status of a sub-agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubagentStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for SubagentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Public snapshot of a run (no cancellation handle).
#[derive(Debug, Clone)]
pub struct SubagentRun {
    pub id: String,
    /// Delegation tool that started the run.
    pub agent: String,
    pub session_id: String,
    pub parent_session_id: String,
    pub parent_message_id: String,
    pub status: SubagentStatus,
    pub result: Option<String>,
    pub created_at: Instant,
}

/// Successful delegation: child session and its final answer.
#[derive(Debug, Clone)]
pub struct DelegateOutcome {
    pub run_id: String,
    pub session_id: String,
    pub answer: String,
}

#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("child registry contains delegating tools: {0}")]
    RecursiveRegistry(String),
    #[error("could not create sub-agent session: {0}")]
    Session(StoreError),
    #[error("sub-agent run failed: {0}")]
    Run(AgentError),
    #[error("sub-agent run cancelled")]
    Cancelled,
}

struct RunEntry {
    info: SubagentRun,
    cancel: Option<CancellationToken>,
}

struct ManagerState {
    runs: HashMap<String, RunEntry>,
}

/// Owns the executor, the child registry and the run map.
pub struct SubagentManager {
    sessions: Arc<dyn SessionService>,
    executor: Arc<dyn TaskExecutor>,
    registry: Arc<ToolRegistry>,
    next_id: AtomicU64,
    state: RwLock<ManagerState>,
}

impl SubagentManager {
    /// `registry` is what every child run may use; it must not contain
    /// delegating tools, so nesting depth is at most one.
    pub fn new(
        sessions: Arc<dyn SessionService>,
        executor: Arc<dyn TaskExecutor>,
        registry: Arc<ToolRegistry>,
    ) -> Result<Self, DelegationError> {
        if registry.has_delegation() {
            let names = registry
                .list_tools()
                .into_iter()
                .map(|i| i.name)
                .filter(|n| registry.resolve(n).is_ok_and(|t| t.delegates()))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DelegationError::RecursiveRegistry(names));
        }
        Ok(Self {
            sessions,
            executor,
            registry,
            next_id: AtomicU64::new(1),
            state: RwLock::new(ManagerState {
                runs: HashMap::new(),
            }),
        })
    }

    #[inline]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run `task` as a child of `parent` and wait for its answer.
    ///
    /// The child session is attributed to `parent`; the run stops when `ctx`
    /// is cancelled or `cancel(run_id)` is called. Child usage is added to the
    /// parent session once the run ends, whatever the outcome.
    pub async fn delegate(
        &self,
        ctx: &ToolCtx,
        parent: &CallContext,
        agent: &str,
        title: String,
        task: String,
    ) -> Result<DelegateOutcome, DelegationError> {
        let child = self
            .sessions
            .create(NewSession::child_of(title, parent))
            .await
            .map_err(DelegationError::Session)?;

        let cancel = ctx.cancellation().child_token();
        let run_id = self.begin(agent, &child.id, parent, cancel.clone());
        let mut guard = RunGuard {
            manager: self,
            run_id: &run_id,
            child_id: &child.id,
            parent,
            finished: false,
        };
        info!(
            run_id = %run_id,
            agent,
            session_id = %child.id,
            parent_session_id = parent.session_id(),
            "sub-agent run started"
        );

        let child_ctx = ToolCtx::new(ctx.workspace.clone(), ctx.restrict_to_workspace)
            .with_cancellation(cancel.clone());
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DelegationError::Cancelled),
            r = self.executor.execute(&child_ctx, &child, &task, &self.registry) => r.map_err(|e| match e {
                AgentError::Cancelled => DelegationError::Cancelled,
                other => DelegationError::Run(other),
            }),
        };

        let (status, summary) = match &result {
            Ok(answer) => (SubagentStatus::Completed, answer.clone()),
            Err(DelegationError::Cancelled) => (SubagentStatus::Cancelled, "Cancelled".to_string()),
            Err(e) => (SubagentStatus::Failed, e.to_string()),
        };
        self.complete_run(&run_id, status.clone(), Some(summary));
        guard.finished = true;
        info!(run_id = %run_id, agent, status = %status, "sub-agent run finished");

        self.roll_up_usage(&child.id, parent).await;

        result.map(|answer| DelegateOutcome {
            run_id: run_id.clone(),
            session_id: child.id.clone(),
            answer,
        })
    }

    /// Mark a run finished. Idempotent: ignored if already terminal.
    pub fn complete_run(&self, run_id: &str, status: SubagentStatus, result: Option<String>) {
        let mut st = self.write_state();
        if let Some(e) = st.runs.get_mut(run_id) {
            if e.info.status != SubagentStatus::Running {
                return;
            }
            e.info.status = status;
            e.info.result = result;
            e.cancel = None;
        }
        prune_completed(&mut st);
    }

    /// Cancel a running run. `true` if it was running and is now cancelled.
    pub fn cancel(&self, run_id: &str) -> bool {
        let mut st = self.write_state();
        let Some(e) = st.runs.get_mut(run_id) else {
            return false;
        };
        if e.info.status != SubagentStatus::Running {
            return false;
        }
        if let Some(token) = e.cancel.take() {
            token.cancel();
        }
        e.info.status = SubagentStatus::Cancelled;
        e.info.result = Some("Cancelled".to_string());
        prune_completed(&mut st);
        true
    }

    pub fn get_run(&self, run_id: &str) -> Option<SubagentRun> {
        self.read_state().runs.get(run_id).map(|e| e.info.clone())
    }

    /// Snapshot of all tracked runs, oldest first.
    pub fn list_runs(&self) -> Vec<SubagentRun> {
        let mut runs: Vec<SubagentRun> =
            self.read_state().runs.values().map(|e| e.info.clone()).collect();
        runs.sort_by_key(|r| r.created_at);
        runs
    }

    fn begin(
        &self,
        agent: &str,
        session_id: &str,
        parent: &CallContext,
        cancel: CancellationToken,
    ) -> String {
        let id_num = self.next_id.fetch_add(1, Ordering::Relaxed);
        let run_id = format!("subagent-{id_num}");
        let entry = RunEntry {
            info: SubagentRun {
                id: run_id.clone(),
                agent: agent.to_string(),
                session_id: session_id.to_string(),
                parent_session_id: parent.session_id().to_string(),
                parent_message_id: parent.message_id().to_string(),
                status: SubagentStatus::Running,
                result: None,
                created_at: Instant::now(),
            },
            cancel: Some(cancel),
        };
        self.write_state().runs.insert(run_id.clone(), entry);
        run_id
    }

    /// Add the child's accumulated usage to the parent session. Best effort:
    /// a missing parent is logged, not reported to the caller.
    async fn roll_up_usage(&self, child_id: &str, parent: &CallContext) {
        roll_up_usage(self.sessions.as_ref(), child_id, parent.session_id()).await;
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn roll_up_usage(sessions: &dyn SessionService, child_id: &str, parent_id: &str) {
    let usage = match sessions.get(child_id).await {
        Ok(child) => Usage::of(&child),
        Err(e) => {
            warn!(session_id = child_id, error = %e, "child session vanished before usage rollup");
            return;
        }
    };
    if usage.is_zero() {
        return;
    }
    if let Err(e) = sessions.add_usage(parent_id, usage).await {
        warn!(
            parent_session_id = parent_id,
            error = %e,
            "could not add sub-agent usage to parent session"
        );
    }
}

/// Cancels the run if `delegate` is dropped before it finishes, and hands the
/// usage rollup to a background task.
struct RunGuard<'a> {
    manager: &'a SubagentManager,
    run_id: &'a str,
    child_id: &'a str,
    parent: &'a CallContext,
    finished: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.manager.cancel(self.run_id);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(run_id = self.run_id, "no runtime to roll up usage of abandoned run");
            return;
        };
        let sessions = Arc::clone(&self.manager.sessions);
        let child_id = self.child_id.to_string();
        let parent_id = self.parent.session_id().to_string();
        handle.spawn(async move {
            roll_up_usage(sessions.as_ref(), &child_id, &parent_id).await;
        });
    }
}

/// Drop finished runs when their count exceeds the cap, keeping the most
/// recent ones. Running runs are never pruned.
fn prune_completed(st: &mut ManagerState) {
    let mut non_running: Vec<(String, Instant)> = st
        .runs
        .iter()
        .filter(|(_, e)| e.info.status != SubagentStatus::Running)
        .map(|(k, e)| (k.clone(), e.info.created_at))
        .collect();

    if non_running.len() <= MAX_COMPLETED_RUNS {
        return;
    }

    non_running.sort_by_key(|(_, t)| *t);
    let to_remove = non_running.len() - MAX_COMPLETED_RUNS;
    for (k, _) in non_running.into_iter().take(to_remove) {
        st.runs.remove(&k);
    }
}
