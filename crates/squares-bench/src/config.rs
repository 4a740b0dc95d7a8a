use serde::{Deserialize, Serialize};
use squares_bot::bot::EngineParams;
use squares_core::model::points::PointSystem;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

const DEFAULT_TIME_BUDGET_MS: u64 = 60_000;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root benchmark configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BenchmarkConfig {
    pub run_id: String,
    pub games: GamesConfig,
    #[serde(default)]
    pub point_system: PointSystemConfig,
    pub agents: Vec<AgentConfig>,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BenchmarkConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: BenchmarkConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        self.games.validate()?;
        self.outputs.validate(&self.run_id)?;
        self.metrics.validate(&self.agents)?;
        self.logging.validate()?;
        validate_agents(&mut self.agents)?;
        Ok(())
    }

    /// Resolve output templates (e.g., `{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            jsonl: resolve_template(&self.run_id, &self.outputs.jsonl),
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
        }
    }

    pub fn points(&self) -> PointSystem {
        self.point_system.resolve()
    }
}

/// Game dealing configuration block.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GamesConfig {
    pub seed: Option<u64>,
    pub count: usize,
    /// Clock each agent gets for a whole game.
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
}

impl GamesConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.count == 0 {
            return Err(ValidationError::field(
                "games.count",
                "number of games must be greater than zero",
            ));
        }

        if self.time_budget_ms == 0 {
            return Err(ValidationError::field(
                "games.time_budget_ms",
                "time budget must be greater than zero",
            ));
        }

        Ok(())
    }
}

fn default_time_budget_ms() -> u64 {
    DEFAULT_TIME_BUDGET_MS
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PointSystemName {
    American,
    British,
}

/// Either a named scoring table or a full custom one.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PointSystemConfig {
    Named(PointSystemName),
    Custom(PointSystem),
}

impl Default for PointSystemConfig {
    fn default() -> Self {
        PointSystemConfig::Named(PointSystemName::American)
    }
}

impl PointSystemConfig {
    pub fn resolve(&self) -> PointSystem {
        match self {
            PointSystemConfig::Named(PointSystemName::American) => PointSystem::american(),
            PointSystemConfig::Named(PointSystemName::British) => PointSystem::british(),
            PointSystemConfig::Custom(points) => *points,
        }
    }
}

/// Definition of a benchmark participant.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub name: String,
    pub kind: AgentKind,
    #[serde(default)]
    pub params: serde_yaml::Value,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Heuristic,
    MonteCarlo,
}

/// Engine overrides accepted in an agent's `params` mapping. Anything left
/// out keeps the `EngineParams` default.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AgentParams {
    pub seed: Option<u64>,
    pub workers: Option<usize>,
    pub deterministic_rounds: Option<usize>,
    pub candidates_limit: Option<usize>,
    pub max_quality_difference: Option<f64>,
    pub target_rounds: Option<usize>,
    pub max_rounds: Option<usize>,
    pub sample_threshold: Option<usize>,
    pub exhaustive_threshold: Option<usize>,
}

impl AgentParams {
    pub fn from_value(value: &serde_yaml::Value) -> Result<Self, serde_yaml::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value.clone())
    }

    /// Name and complaint for the first override outside its valid range.
    pub fn out_of_range(&self) -> Option<(&'static str, &'static str)> {
        if self
            .max_quality_difference
            .is_some_and(|diff| !diff.is_finite() || diff <= 0.0)
        {
            return Some(("max_quality_difference", "must be a finite number above zero"));
        }
        let counts = [
            ("candidates_limit", self.candidates_limit),
            ("deterministic_rounds", self.deterministic_rounds),
            ("target_rounds", self.target_rounds),
            ("max_rounds", self.max_rounds),
            ("sample_threshold", self.sample_threshold),
            ("exhaustive_threshold", self.exhaustive_threshold),
        ];
        counts
            .into_iter()
            .find(|(_, value)| *value == Some(0))
            .map(|(name, _)| (name, "must be at least one"))
    }

    /// Layers the overrides on top of `base`.
    pub fn apply(&self, base: EngineParams) -> EngineParams {
        let mut params = match self.deterministic_rounds {
            Some(rounds) => EngineParams {
                deterministic_rounds: Some(rounds),
                workers: Some(0),
                ..base
            },
            None => base,
        };
        if let Some(workers) = self.workers {
            params.workers = Some(workers);
        }
        if let Some(limit) = self.candidates_limit {
            params.candidates_limit = limit;
        }
        if let Some(diff) = self.max_quality_difference {
            params.max_quality_difference = diff;
        }
        if let Some(rounds) = self.target_rounds {
            params.target_rounds = rounds;
        }
        if let Some(rounds) = self.max_rounds {
            params.max_rounds = rounds;
        }
        if let Some(threshold) = self.sample_threshold {
            params.sample_threshold = threshold;
        }
        if let Some(threshold) = self.exhaustive_threshold {
            params.exhaustive_threshold = threshold;
        }
        params
    }
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    pub jsonl: String,
    pub summary_md: String,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.jsonl", &self.jsonl),
            ("outputs.summary_md", &self.summary_md),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::field(label, "path must not be empty"));
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::field(label, "resolved path is invalid"));
            }
        }
        Ok(())
    }
}

/// Metrics configuration block.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MetricsConfig {
    #[serde(default)]
    pub baseline: Option<String>,
}

impl MetricsConfig {
    fn validate(&self, agents: &[AgentConfig]) -> Result<(), ValidationError> {
        let Some(baseline) = self.baseline.as_ref() else {
            return Err(ValidationError::field(
                "metrics.baseline",
                "baseline agent must be specified",
            ));
        };

        if !agents.iter().any(|a| &a.name == baseline) {
            return Err(ValidationError::field(
                "metrics.baseline",
                format!("baseline agent '{baseline}' is not defined in agents list"),
            ));
        }

        Ok(())
    }
}

/// Logging configuration defaults to disabled structured logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
    /// Per-target overrides, e.g. `squares_bot::search: debug`.
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
            targets: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    fn validate(&mut self) -> Result<(), ValidationError> {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
        if self.level().is_none() {
            return Err(ValidationError::field(
                "logging.tracing_level",
                format!("unknown level '{}'", self.tracing_level),
            ));
        }
        for (target, level) in &self.targets {
            let valid_target = target.split("::").all(|part| {
                !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
            if !valid_target {
                return Err(ValidationError::field(
                    "logging.targets",
                    format!("invalid target '{target}'"),
                ));
            }
            if parse_level(level).is_none() {
                return Err(ValidationError::field(
                    format!("logging.targets.{target}"),
                    format!("unknown level '{level}'"),
                ));
            }
        }
        Ok(())
    }

    pub fn level(&self) -> Option<Level> {
        parse_level(&self.tracing_level)
    }

    /// Filter directives for the configured levels, default level first.
    pub fn directives(&self) -> String {
        let level = self.level().unwrap_or(Level::INFO);
        let mut directives = vec![level.as_str().to_ascii_lowercase()];
        for (target, level) in &self.targets {
            if let Some(level) = parse_level(level) {
                directives.push(format!("{target}={}", level.as_str().to_ascii_lowercase()));
            }
        }
        directives.join(",")
    }
}

fn parse_level(text: &str) -> Option<Level> {
    match text.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::field("run_id", "run_id must not be empty"));
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::field(
            "run_id",
            "run_id may only contain alphanumeric characters, '.', '_' or '-'",
        ));
    }

    Ok(())
}

fn validate_agents(agents: &mut [AgentConfig]) -> Result<(), ValidationError> {
    if agents.is_empty() {
        return Err(ValidationError::field("agents", "at least one agent must be specified"));
    }

    let mut seen = HashSet::new();
    for agent in agents.iter_mut() {
        if agent.name.trim().is_empty() {
            return Err(ValidationError::field("agents.name", "agent name must not be empty"));
        }

        if !agent.name.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
            return Err(ValidationError::field(
                format!("agents[{}].name", agent.name),
                "agent name contains invalid characters",
            ));
        }

        if !seen.insert(agent.name.clone()) {
            return Err(ValidationError::field(
                "agents",
                format!("agent name '{}' defined more than once", agent.name),
            ));
        }

        let params = AgentParams::from_value(&agent.params).map_err(|err| {
            ValidationError::field(format!("agents[{}].params", agent.name), err.to_string())
        })?;
        if let Some((key, message)) = params.out_of_range() {
            return Err(ValidationError::field(
                format!("agents[{}].params.{key}", agent.name),
                message,
            ));
        }

        if agent.params.is_null() {
            agent.params = serde_yaml::Value::Mapping(Default::default());
        }
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    let replaced = template.replace("{run_id}", run_id);
    PathBuf::from(replaced)
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub jsonl: PathBuf,
    pub summary_md: PathBuf,
}

impl ResolvedOutputs {
    /// Directory holding the summary, where telemetry lands too.
    pub fn telemetry_dir(&self) -> PathBuf {
        self.summary_md
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path.as_path(),
        }
    }
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}

impl ValidationError {
    fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}
