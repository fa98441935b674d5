//! Config load, env overrides, validation.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Root config: workspace, llm, agent limits, dispatch policy, tool options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub workspace: Option<String>,
    pub restrict_to_workspace: Option<bool>,
    pub llm: Option<LlmConfig>,
    pub agent: Option<AgentConfig>,
    pub dispatch: Option<DispatchConfig>,
    pub tools: Option<ToolsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LlmConfig {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// USD per million prompt tokens; used for session cost.
    pub prompt_cost_per_mtok: Option<f64>,
    /// USD per million completion tokens.
    pub completion_cost_per_mtok: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AgentConfig {
    pub max_iterations: Option<u32>,
    pub subagent_max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DispatchConfig {
    /// Per-call limit for leaf tools. 0 or absent = unbounded.
    pub timeout_secs: Option<u64>,
    /// Per-call limit for delegation tools (covers the whole nested run).
    pub delegation_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolsConfig {
    pub fetch_max_chars: Option<u32>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(String),
    #[error("config parse: {0}")]
    Parse(String),
    #[error("config validation: {0}")]
    Validation(String),
}

pub const DEFAULT_MAX_ITERATIONS: u32 = 20;
pub const DEFAULT_SUBAGENT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

impl Config {
    /// Workspace root; current directory when unset.
    pub fn workspace_path(&self) -> PathBuf {
        self.workspace
            .as_deref()
            .filter(|w| !w.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    #[inline]
    pub fn restrict(&self) -> bool {
        self.restrict_to_workspace.unwrap_or(true)
    }

    pub fn model(&self) -> &str {
        self.llm
            .as_ref()
            .and_then(|l| l.model.as_deref())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }

    pub fn max_iterations(&self) -> u32 {
        self.agent
            .as_ref()
            .and_then(|a| a.max_iterations)
            .unwrap_or(DEFAULT_MAX_ITERATIONS)
    }

    pub fn subagent_max_iterations(&self) -> u32 {
        self.agent
            .as_ref()
            .and_then(|a| a.subagent_max_iterations)
            .unwrap_or(DEFAULT_SUBAGENT_MAX_ITERATIONS)
    }

    /// Reject configs the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_key = self
            .llm
            .as_ref()
            .and_then(|l| l.api_key.as_deref())
            .is_some_and(|k| !k.trim().is_empty());
        if !has_key {
            return Err(ConfigError::Validation(
                "llm.api-key is required (or set TOOLHOST_API_KEY)".into(),
            ));
        }
        if self.max_iterations() == 0 || self.subagent_max_iterations() == 0 {
            return Err(ConfigError::Validation(
                "agent iteration limits must be at least 1".into(),
            ));
        }
        if let Some(llm) = &self.llm {
            let negative = [llm.prompt_cost_per_mtok, llm.completion_cost_per_mtok]
                .into_iter()
                .flatten()
                .any(|c| c < 0.0);
            if negative {
                return Err(ConfigError::Validation("llm costs must not be negative".into()));
            }
        }
        Ok(())
    }
}

/// `$TOOLHOST_CONFIG`, else `~/.toolhost/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Some(p) = std::env::var_os("TOOLHOST_CONFIG") {
        return PathBuf::from(p);
    }
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".toolhost").join("config.toml")
}

/// Parse config TOML (no env, no validation).
pub fn parse(text: &str) -> Result<Config, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Load from `path` (missing file = defaults), apply env overrides, validate.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let cfg = load_unvalidated(path)?;
    cfg.validate()?;
    Ok(cfg)
}

/// As `load`, without validation; for commands that never call the model.
pub fn load_unvalidated(path: &Path) -> Result<Config, ConfigError> {
    let mut cfg = match std::fs::read_to_string(path) {
        Ok(text) => parse(&text)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(ConfigError::Io(format!("{}: {e}", path.display()))),
    };
    apply_env_overrides(&mut cfg, |k| std::env::var(k).ok());
    Ok(cfg)
}

/// Overlay non-empty `TOOLHOST_*` values from `lookup` onto `cfg`.
pub fn apply_env_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
    if let Some(ws) = get("TOOLHOST_WORKSPACE") {
        cfg.workspace = Some(ws);
    }
    let llm = cfg.llm.get_or_insert_with(LlmConfig::default);
    if let Some(key) = get("TOOLHOST_API_KEY") {
        llm.api_key = Some(key);
    }
    if let Some(base) = get("TOOLHOST_API_BASE") {
        llm.api_base = Some(base);
    }
    if let Some(model) = get("TOOLHOST_MODEL") {
        llm.model = Some(model);
    }
}
