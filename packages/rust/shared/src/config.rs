//! Application configuration for objectivedb.
//!
//! User config lives at `~/.objectivedb/objectivedb.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ObjectiveDbError, Result};
use crate::reference::ReferenceData;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "objectivedb.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".objectivedb";

// ---------------------------------------------------------------------------
// Config structs (matching objectivedb.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Search and fetch settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// PDF link checks.
    #[serde(default)]
    pub pdf: PdfConfig,

    /// Optional TOML file overriding the built-in reference data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_path: Option<String>,
}

/// How tests are sourced for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Search the web for authoritative listings.
    Discover,
    /// Skip the network and use each unit's sample catalog.
    Demo,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Demo => "demo",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunMode {
    type Err = ObjectiveDbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "discover" => Ok(Self::Discover),
            "demo" => Ok(Self::Demo),
            other => Err(ObjectiveDbError::config(format!(
                "unknown mode '{other}' (expected discover or demo)"
            ))),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the libSQL database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory for JSONL exports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Inferred objectives below this confidence are dropped.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Test sourcing mode.
    #[serde(default = "default_mode")]
    pub mode: RunMode,

    /// Fall back to the sample catalog when discovery finds nothing.
    #[serde(default = "default_true")]
    pub synthesize_when_empty: bool,

    /// Fetch each test's source page and extract objectives before inferring.
    #[serde(default = "default_true")]
    pub extract_objectives: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            output_dir: default_output_dir(),
            confidence_threshold: default_confidence_threshold(),
            mode: default_mode(),
            synthesize_when_empty: true,
            extract_objectives: true,
        }
    }
}

fn default_db_path() -> String {
    "~/.objectivedb/objectives.db".into()
}
fn default_output_dir() -> String {
    "data".into()
}
fn default_confidence_threshold() -> f64 {
    0.4
}
fn default_mode() -> RunMode {
    RunMode::Discover
}
fn default_true() -> bool {
    true
}

/// `[discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Hits considered per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Courtesy delay between queries.
    #[serde(default = "default_query_delay_ms")]
    pub query_delay_ms: u64,

    /// Per-request timeout for search and fetch.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Wall-clock budget for one processing unit.
    #[serde(default = "default_unit_timeout")]
    pub unit_timeout_secs: u64,

    /// SearXNG-compatible JSON search endpoint.
    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,

    /// Name of the env var holding an optional search API key (never store the key itself).
    #[serde(default = "default_search_api_key_env")]
    pub search_api_key_env: String,

    /// Upper bound on hits read from one search response.
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            query_delay_ms: default_query_delay_ms(),
            request_timeout_secs: default_request_timeout(),
            unit_timeout_secs: default_unit_timeout(),
            search_endpoint: default_search_endpoint(),
            search_api_key_env: default_search_api_key_env(),
            max_search_results: default_max_search_results(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_query_delay_ms() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    30
}
fn default_unit_timeout() -> u64 {
    600
}
fn default_search_endpoint() -> String {
    "http://localhost:8888/search".into()
}
fn default_search_api_key_env() -> String {
    "OBJECTIVEDB_SEARCH_KEY".into()
}
fn default_max_search_results() -> usize {
    20
}

/// `[pdf]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    #[serde(default = "default_pdf_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_pdf_timeout(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_pdf_timeout() -> u64 {
    10
}
fn default_max_redirects() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Database file.
    pub db_path: PathBuf,
    /// Export directory.
    pub output_dir: PathBuf,
    /// Inclusive lower bound for inferred objective confidence.
    pub confidence_threshold: f64,
    /// Test sourcing mode.
    pub mode: RunMode,
    /// Fall back to sample tests when discovery is empty.
    pub synthesize_when_empty: bool,
    /// Try extraction from each test's source page first.
    pub extract_objectives: bool,
    /// Hits considered per query.
    pub top_k: usize,
    /// Courtesy delay between queries, in ms.
    pub query_delay_ms: u64,
    /// HTTP request timeout, in seconds.
    pub request_timeout_secs: u64,
    /// Per-unit timeout, in seconds.
    pub unit_timeout_secs: u64,
    /// Search endpoint URL.
    pub search_endpoint: String,
    /// Env var holding the optional search API key.
    pub search_api_key_env: String,
    /// Max hits read from one search response.
    pub max_search_results: usize,
    /// PDF check timeout, in seconds.
    pub pdf_timeout_secs: u64,
    /// PDF check redirect limit.
    pub pdf_max_redirects: usize,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            db_path: expand_home(&config.defaults.db_path),
            output_dir: expand_home(&config.defaults.output_dir),
            confidence_threshold: config.defaults.confidence_threshold,
            mode: config.defaults.mode,
            synthesize_when_empty: config.defaults.synthesize_when_empty,
            extract_objectives: config.defaults.extract_objectives,
            top_k: config.discovery.top_k,
            query_delay_ms: config.discovery.query_delay_ms,
            request_timeout_secs: config.discovery.request_timeout_secs,
            unit_timeout_secs: config.discovery.unit_timeout_secs,
            search_endpoint: config.discovery.search_endpoint.clone(),
            search_api_key_env: config.discovery.search_api_key_env.clone(),
            max_search_results: config.discovery.max_search_results,
            pdf_timeout_secs: config.pdf.timeout_secs,
            pdf_max_redirects: config.pdf.max_redirects,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl RunConfig {
    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ObjectiveDbError::config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.top_k == 0 {
            return Err(ObjectiveDbError::config("top_k must be at least 1"));
        }
        if self.unit_timeout_secs == 0 {
            return Err(ObjectiveDbError::config("unit_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    /// Read the search API key from the configured env var, if set.
    pub fn search_api_key(&self) -> Option<String> {
        std::env::var(&self.search_api_key_env)
            .ok()
            .filter(|v| !v.is_empty())
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.objectivedb/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ObjectiveDbError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.objectivedb/objectivedb.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ObjectiveDbError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ObjectiveDbError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ObjectiveDbError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ObjectiveDbError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ObjectiveDbError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the reference data: the `reference_path` override if configured,
/// otherwise the built-in defaults.
pub fn load_reference_data(config: &AppConfig) -> Result<ReferenceData> {
    match &config.reference_path {
        Some(path) => {
            let path = expand_home(path);
            tracing::info!(?path, "loading reference data override");
            ReferenceData::from_toml_file(&path)
        }
        None => Ok(ReferenceData::default()),
    }
}
