//! toolhost: run one coding-agent task against the workspace, or list tools.
//!
//! Config: `~/.toolhost/config.toml` (or `$TOOLHOST_CONFIG`) plus `TOOLHOST_*` env.
//! Log level: `RUST_LOG` (default `info`).

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use toolhost::BoxFuture;
use toolhost::agent::{AgentError, AgentLoop, SubagentManager, TaskExecutor};
use toolhost::config::{self, Config};
use toolhost::llm::{HttpProvider, ModelClient, Pricing};
use toolhost::session::{InMemoryMessages, InMemorySessions, MessageService, Session, SessionService};
use toolhost::tools::{self, ToolCtx, ToolRegistry};

const USAGE: &str = "usage: toolhost tools | toolhost run <task...>";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let path = config::default_config_path();
    match args.first().map(String::as_str) {
        Some("tools") => match config::load_unvalidated(&path) {
            Ok(cfg) => list_tools(&cfg),
            Err(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
        },
        Some("run") if args.len() > 1 => match config::load(&path) {
            Ok(cfg) => run(&cfg, &args[1..].join(" ")).await,
            Err(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
        },
        _ => {
            eprintln!("{USAGE}");
            ExitCode::from(2)
        }
    }
}

fn list_tools(cfg: &Config) -> ExitCode {
    let sessions: Arc<dyn SessionService> = Arc::new(InMemorySessions::new());
    let registry = match agent_registry(cfg, sessions, Arc::new(ListingOnly)) {
        Ok(r) => r,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    for line in registry.summaries() {
        println!("{line}");
    }
    ExitCode::SUCCESS
}

/// Leaf tools for sub-agents on `executor`, plus the delegation tools.
fn agent_registry(
    cfg: &Config,
    sessions: Arc<dyn SessionService>,
    executor: Arc<dyn TaskExecutor>,
) -> Result<ToolRegistry, String> {
    let leaf = tools::build_leaf_registry(cfg).map_err(|e| e.to_string())?;
    let manager = SubagentManager::new(sessions, executor, Arc::new(leaf)).map_err(|e| e.to_string())?;
    tools::build_agent_registry(cfg, Arc::new(manager)).map_err(|e| e.to_string())
}

/// Executor for `toolhost tools`, which lists the registry but never runs it.
struct ListingOnly;

impl TaskExecutor for ListingOnly {
    fn execute<'a>(
        &'a self,
        _ctx: &'a ToolCtx,
        _session: &'a Session,
        _task: &'a str,
        _registry: &'a ToolRegistry,
    ) -> BoxFuture<'a, Result<String, AgentError>> {
        Box::pin(std::future::ready(Err(AgentError::Cancelled)))
    }
}

async fn run(cfg: &Config, task: &str) -> ExitCode {
    let llm: Arc<dyn ModelClient> = match HttpProvider::from_config(cfg) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let sessions: Arc<dyn SessionService> = Arc::new(InMemorySessions::new());
    let messages: Arc<dyn MessageService> = Arc::new(InMemoryMessages::new());
    let pricing = Pricing::from_config(cfg);

    let child_loop = AgentLoop::new(
        Arc::clone(&llm),
        Arc::clone(&sessions),
        Arc::clone(&messages),
        cfg.model(),
        cfg.subagent_max_iterations(),
    )
    .with_pricing(pricing);
    let registry = match agent_registry(cfg, Arc::clone(&sessions), Arc::new(child_loop)) {
        Ok(r) => r,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let agent = AgentLoop::new(llm, sessions, messages, cfg.model(), cfg.max_iterations())
        .with_pricing(pricing);
    let ctx = ToolCtx::new(cfg.workspace_path(), cfg.restrict());
    let cancel = ctx.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });

    info!(workspace = %cfg.workspace_path().display(), model = cfg.model(), tools = registry.len(), "starting");
    match agent.run_task(&ctx, &registry, "toolhost run", task).await {
        Ok((session, answer)) => {
            println!("{answer}");
            info!(
                session_id = %session.id,
                prompt_tokens = session.prompt_tokens,
                completion_tokens = session.completion_tokens,
                cost = session.cost,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
