//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! the path given with `-f`), then applies `ASKDB_WORK_DIR`, `ASKDB_LOG_LEVEL`
//! and `ASKDB_DATABASE_URI` env overrides. The LLM API key is only ever read
//! from `LLM_API_KEY`.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Database accessor configuration (`[database]`).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:///path/to/file.sqlite` or a bare path.
    pub uri: String,
    /// Open the connection read-only so generated SQL cannot modify data.
    pub read_only: bool,
    /// Sample rows appended to each table description.
    pub sample_rows: usize,
}

/// OpenAI / OpenAI-compatible endpoint configuration.
/// Shared shape for `[llm.openai]` and `[embeddings.openai]`.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full endpoint URL (`.../v1/chat/completions` or `.../v1/embeddings`).
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature (ignored by the embeddings endpoint).
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// Chat model configuration (`[llm]`).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider (`"dummy"` or `"openai"`). `default` in TOML.
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// Embedding model configuration (`[embeddings]`).
#[derive(Debug, Clone)]
pub struct EmbeddingsConfig {
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// Tool-using agent configuration (`[agent]`).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Row limit the agent is told to respect unless the user asks otherwise.
    pub top_k: usize,
    /// Model calls allowed per question before the run is abandoned.
    pub max_steps: usize,
}

/// Counting-path chain configuration (`[chain]`).
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub top_k: usize,
}

/// Proper-noun lookup configuration (`[lookup]`).
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub enabled: bool,
    /// Results returned per search.
    pub top_k: usize,
    /// Single-column queries whose values are indexed.
    pub sources: Vec<String>,
    /// Index file, relative to `work_dir` unless absolute.
    pub index_file: PathBuf,
}

/// Session checkpoint configuration (`[checkpoint]`).
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub enabled: bool,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Directory searched for prompt override files.
    pub prompts_dir: PathBuf,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embeddings: EmbeddingsConfig,
    pub agent: AgentConfig,
    pub chain: ChainConfig,
    pub lookup: LookupConfig,
    pub checkpoint: CheckpointConfig,
    /// API key from `LLM_API_KEY`; `None` for keyless local models.
    pub llm_api_key: Option<String>,
}

impl Config {
    /// Absolute path of the proper-noun index file.
    pub fn lookup_index_path(&self) -> PathBuf {
        resolve_in(&self.work_dir, &self.lookup.index_file)
    }

    /// Directory that holds session checkpoints.
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.work_dir.join("checkpoints")
    }
}

// ── Raw TOML shape ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    app: RawApp,
    database: RawDatabase,
    #[serde(default)]
    llm: RawProviderSection,
    #[serde(default = "default_embeddings_section")]
    embeddings: RawProviderSection,
    #[serde(default)]
    agent: RawAgent,
    #[serde(default)]
    chain: RawChain,
    #[serde(default)]
    lookup: RawLookup,
    #[serde(default)]
    checkpoint: RawCheckpoint,
}

#[derive(Deserialize)]
struct RawApp {
    #[serde(default = "default_app_name")]
    name: String,
    work_dir: String,
    log_level: String,
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
}

#[derive(Deserialize)]
struct RawDatabase {
    uri: String,
    #[serde(default = "default_true")]
    read_only: bool,
    #[serde(default = "default_sample_rows")]
    sample_rows: usize,
}

#[derive(Deserialize)]
struct RawProviderSection {
    /// Maps to `default = "..."`; other provider sections may coexist unused.
    #[serde(rename = "default", default = "default_provider")]
    provider: String,
    #[serde(default)]
    openai: Option<RawOpenAiConfig>,
}

impl Default for RawProviderSection {
    fn default() -> Self {
        Self { provider: default_provider(), openai: None }
    }
}

#[derive(Deserialize, Default)]
struct RawOpenAiConfig {
    api_base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    timeout_seconds: Option<u64>,
}

impl RawOpenAiConfig {
    fn resolve(self, default_url: &str, default_model: &str) -> OpenAiConfig {
        OpenAiConfig {
            api_base_url: self.api_base_url.unwrap_or_else(|| default_url.to_string()),
            model: self.model.unwrap_or_else(|| default_model.to_string()),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            timeout_seconds: self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        }
    }
}

#[derive(Deserialize)]
struct RawAgent {
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_max_steps")]
    max_steps: usize,
}

impl Default for RawAgent {
    fn default() -> Self {
        Self { top_k: default_top_k(), max_steps: default_max_steps() }
    }
}

#[derive(Deserialize)]
struct RawChain {
    #[serde(default = "default_top_k")]
    top_k: usize,
}

impl Default for RawChain {
    fn default() -> Self {
        Self { top_k: default_top_k() }
    }
}

#[derive(Deserialize)]
struct RawLookup {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_lookup_sources")]
    sources: Vec<String>,
    #[serde(default = "default_index_file")]
    index_file: String,
}

impl Default for RawLookup {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            sources: default_lookup_sources(),
            index_file: default_index_file(),
        }
    }
}

#[derive(Deserialize)]
struct RawCheckpoint {
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawCheckpoint {
    fn default() -> Self {
        Self { enabled: true }
    }
}

const DEFAULT_TEMPERATURE: f32 = 0.5;
const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
const DEFAULT_CHAT_URL: &str = "http://localhost:11434/v1/chat/completions";
const DEFAULT_CHAT_MODEL: &str = "codegemma:latest";
const DEFAULT_EMBEDDINGS_URL: &str = "http://localhost:11434/v1/embeddings";
const DEFAULT_EMBEDDINGS_MODEL: &str = "llama3";

fn default_app_name() -> String { "askdb".to_string() }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_provider() -> String { "dummy".to_string() }
fn default_embeddings_section() -> RawProviderSection { RawProviderSection::default() }
fn default_sample_rows() -> usize { 3 }
fn default_top_k() -> usize { 5 }
fn default_max_steps() -> usize { 15 }
fn default_index_file() -> String { "lookup/proper_nouns.db".to_string() }
fn default_true() -> bool { true }

fn default_lookup_sources() -> Vec<String> {
    vec![
        "SELECT Name FROM Artist".to_string(),
        "SELECT Title FROM Album".to_string(),
    ]
}

/// Load config from `path` (or `config/default.toml`), then apply env overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let overrides = Overrides {
        work_dir: env::var("ASKDB_WORK_DIR").ok(),
        log_level: env::var("ASKDB_LOG_LEVEL").ok(),
        database_uri: env::var("ASKDB_DATABASE_URI").ok(),
    };
    let mut config = load_from(Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)), &overrides)?;
    config.llm_api_key = env::var("LLM_API_KEY").ok();
    Ok(config)
}

/// Overrides normally sourced from env vars.
/// Tests pass these directly instead of mutating the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub database_uri: Option<String>,
}

/// Internal loader: explicit path and overrides, no env access.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let app = parsed.app;
    let work_dir = expand_home(overrides.work_dir.as_deref().unwrap_or(&app.work_dir));
    let log_level = overrides.log_level.clone().unwrap_or(app.log_level);
    let database_uri = overrides.database_uri.clone().unwrap_or(parsed.database.uri);

    if database_uri.trim().is_empty() {
        return Err(AppError::Config("database.uri must not be empty".into()));
    }
    if parsed.agent.max_steps == 0 {
        return Err(AppError::Config("agent.max_steps must be at least 1".into()));
    }

    Ok(Config {
        app_name: app.name,
        work_dir,
        log_level,
        prompts_dir: expand_home(&app.prompts_dir),
        database: DatabaseConfig {
            uri: database_uri,
            read_only: parsed.database.read_only,
            sample_rows: parsed.database.sample_rows,
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: parsed
                .llm
                .openai
                .unwrap_or_default()
                .resolve(DEFAULT_CHAT_URL, DEFAULT_CHAT_MODEL),
        },
        embeddings: EmbeddingsConfig {
            provider: parsed.embeddings.provider,
            openai: parsed
                .embeddings
                .openai
                .unwrap_or_default()
                .resolve(DEFAULT_EMBEDDINGS_URL, DEFAULT_EMBEDDINGS_MODEL),
        },
        agent: AgentConfig {
            top_k: parsed.agent.top_k,
            max_steps: parsed.agent.max_steps,
        },
        chain: ChainConfig { top_k: parsed.chain.top_k },
        lookup: LookupConfig {
            enabled: parsed.lookup.enabled,
            top_k: parsed.lookup.top_k,
            sources: parsed.lookup.sources,
            index_file: PathBuf::from(parsed.lookup.index_file),
        },
        checkpoint: CheckpointConfig { enabled: parsed.checkpoint.enabled },
        llm_api_key: None,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

fn resolve_in(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() { path.to_path_buf() } else { base.join(path) }
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: dummy providers, no API keys, no network.
#[cfg(test)]
impl Config {
    pub fn test_default(work_dir: &Path, database_uri: &str) -> Self {
        let endpoint = OpenAiConfig {
            api_base_url: "http://localhost:0/v1/chat/completions".into(),
            model: "test-model".into(),
            temperature: 0.0,
            timeout_seconds: 1,
        };
        Self {
            app_name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            prompts_dir: work_dir.join("prompts"),
            database: DatabaseConfig {
                uri: database_uri.to_string(),
                read_only: true,
                sample_rows: 3,
            },
            llm: LlmConfig { provider: "dummy".into(), openai: endpoint.clone() },
            embeddings: EmbeddingsConfig { provider: "dummy".into(), openai: endpoint },
            agent: AgentConfig { top_k: 5, max_steps: 6 },
            chain: ChainConfig { top_k: 5 },
            lookup: LookupConfig {
                enabled: true,
                top_k: 5,
                sources: default_lookup_sources(),
                index_file: PathBuf::from(default_index_file()),
            },
            checkpoint: CheckpointConfig { enabled: false },
            llm_api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[app]
work_dir = "~/.askdb"
log_level = "info"

[database]
uri = "sqlite:///Chinook_Sqlite.sqlite"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_minimal_config_fills_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(cfg.app_name, "askdb");
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.database.read_only);
        assert_eq!(cfg.database.sample_rows, 3);
        assert_eq!(cfg.llm.provider, "dummy");
        assert_eq!(cfg.llm.openai.model, DEFAULT_CHAT_MODEL);
        assert_eq!(cfg.embeddings.openai.model, DEFAULT_EMBEDDINGS_MODEL);
        assert_eq!(cfg.agent.top_k, 5);
        assert_eq!(cfg.lookup.sources.len(), 2);
        assert!(cfg.checkpoint.enabled);
    }

    #[test]
    fn provider_sections_parse() {
        let f = write_toml(&format!(
            "{MINIMAL_TOML}
[llm]
default = \"openai\"

[llm.openai]
model = \"gemma3\"
temperature = 0.0

[embeddings]
default = \"openai\"

[embeddings.openai]
api_base_url = \"http://embed:1/v1/embeddings\"
"
        ));
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.openai.model, "gemma3");
        assert_eq!(cfg.llm.openai.temperature, 0.0);
        assert_eq!(cfg.llm.openai.api_base_url, DEFAULT_CHAT_URL);
        assert_eq!(cfg.embeddings.openai.api_base_url, "http://embed:1/v1/embeddings");
    }

    #[test]
    fn lookup_index_path_resolves_under_work_dir() {
        let f = write_toml(MINIMAL_TOML);
        let overrides = Overrides { work_dir: Some("/tmp/askdb-test".into()), ..Default::default() };
        let cfg = load_from(f.path(), &overrides).unwrap();
        assert_eq!(cfg.lookup_index_path(), PathBuf::from("/tmp/askdb-test/lookup/proper_nouns.db"));
        assert_eq!(cfg.checkpoint_dir(), PathBuf::from("/tmp/askdb-test/checkpoints"));
    }

    #[test]
    fn overrides_win_over_file() {
        let f = write_toml(MINIMAL_TOML);
        let overrides = Overrides {
            work_dir: Some("/tmp/override".into()),
            log_level: Some("debug".into()),
            database_uri: Some("sqlite:///other.db".into()),
        };
        let cfg = load_from(f.path(), &overrides).unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/override"));
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.database.uri, "sqlite:///other.db");
    }

    #[test]
    fn zero_max_steps_rejected() {
        let f = write_toml(&format!("{MINIMAL_TOML}\n[agent]\nmax_steps = 0\n"));
        let err = load_from(f.path(), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("max_steps"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), &Overrides::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.askdb");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".askdb"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
