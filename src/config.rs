use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{AutoblogError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Primary keyword of the article.  Overridable with `KEYPHRASE`.
    #[serde(default)]
    pub keyword: String,

    /// Locale passed to the scorer and used for the document's `lang`.
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Directory holding `<keyword>.json` / `<keyword>.html`.
    /// Empty means the current working directory.
    #[serde(default)]
    pub output_dir: String,

    /// Existing posts offered as internal-link candidates: numeric ids or
    /// slugs.  Overridable with `RELATED_ARTICLE_IDS` (comma separated).
    #[serde(default)]
    pub related_articles: Vec<String>,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub wordpress: WordPressConfig,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub scorer: ScorerConfig,

    #[serde(default)]
    pub optimize: OptimizeConfig,

    #[serde(default)]
    pub images: ImagesConfig,
}

// -- LLM -----------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Backend to use.  Only `"openai"` ships built in.
    /// Can be overridden with the `LLM_BACKEND` env var.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// API key.  Can be overridden with the `OPENAI_API_KEY` env var.
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for article generation.
    /// Can be overridden with the `OPENAI_MODEL` env var.
    #[serde(default = "default_model")]
    pub model: String,

    /// Attach the hosted web-search tool to generation requests.
    #[serde(default = "default_true")]
    pub web_search: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds (0 = 300s).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// -- Retry ---------------------------------------------------------------

/// Backoff applied to generation, WordPress, search and image calls.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// First backoff delay in milliseconds.
    #[serde(default = "default_retry_base_ms")]
    pub base_ms: u64,

    /// Upper bound for a single backoff delay in milliseconds.
    #[serde(default = "default_retry_cap_ms")]
    pub cap_ms: u64,

    /// Total attempts per call, including the first one.
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
}

// -- WordPress -----------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WordPressConfig {
    /// Site root, e.g. "https://example.com".  Overridable with `SITE_URL`.
    #[serde(default)]
    pub site_url: String,

    /// Overridable with `WP_API_USER`.
    #[serde(default)]
    pub username: String,

    /// Application password.  Overridable with `WP_API_PASS`.
    #[serde(default)]
    pub password: String,

    /// Status of created posts ("draft", "publish", "pending").
    #[serde(default = "default_post_status")]
    pub post_status: String,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

// -- Research ------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchConfig {
    /// Skip competitive research entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Google API key.  Overridable with `GOOGLE_API_KEY`.
    #[serde(default)]
    pub google_api_key: String,

    /// Custom Search engine id.  Overridable with `GOOGLE_CSE_ID`.
    #[serde(default)]
    pub google_cse_id: String,

    /// Number of competitor pages summarised.
    #[serde(default = "default_research_pages")]
    pub pages: usize,

    /// Pages fetched concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Domain suffixes never used as competitors.
    #[serde(default = "default_excluded_domains")]
    pub excluded_domains: Vec<String>,

    /// Maximum characters kept from each page body.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

// -- Scorer --------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ScorerConfig {
    /// Interpreter used to run the scorer script.
    #[serde(default = "default_scorer_program")]
    pub program: String,

    /// Path of the scorer script.
    #[serde(default = "default_scorer_script")]
    pub script: String,

    /// Finding identifiers (or whole result groups) never reported.
    #[serde(default)]
    pub suppressed: Vec<String>,
}

// -- Optimize ------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Revision rounds before giving up.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// The loop stops once this many findings or fewer remain.
    #[serde(default = "default_max_problems")]
    pub max_problems: usize,

    /// Fix-request turns spent on malformed structured output.
    #[serde(default = "default_repair_attempts")]
    pub repair_attempts: usize,
}

// -- Images --------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Where placeholder images come from: `"generate"` (OpenAI Images) or
    /// `"search"` (Google image search, needs the research credentials).
    #[serde(default = "default_image_source")]
    pub source: String,

    /// Appended to every image search query.
    #[serde(default = "default_image_search_suffix")]
    pub search_suffix: String,

    /// Image search results checked per placeholder.
    #[serde(default = "default_image_candidates")]
    pub search_candidates: usize,

    #[serde(default = "default_image_model")]
    pub model: String,

    #[serde(default = "default_image_size")]
    pub size: String,

    /// Images generated concurrently per batch.
    #[serde(default = "default_image_batch")]
    pub batch_size: usize,
}

// -- Defaults ------------------------------------------------------------

fn default_locale() -> String {
    "fa".into()
}
fn default_backend() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4.1".into()
}
fn default_true() -> bool {
    true
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_retry_base_ms() -> u64 {
    1_000
}
fn default_retry_cap_ms() -> u64 {
    60_000
}
fn default_retry_attempts() -> u32 {
    6
}
fn default_post_status() -> String {
    "draft".into()
}
fn default_http_timeout_secs() -> u64 {
    30
}
fn default_research_pages() -> usize {
    5
}
fn default_batch_size() -> usize {
    4
}
fn default_excluded_domains() -> Vec<String> {
    vec!["wikipedia.org".into()]
}
fn default_excerpt_chars() -> usize {
    4_000
}
fn default_scorer_program() -> String {
    "node".into()
}
fn default_scorer_script() -> String {
    "yoast_seo.js".into()
}
fn default_max_iterations() -> usize {
    100
}
fn default_max_problems() -> usize {
    1
}
fn default_repair_attempts() -> usize {
    3
}
fn default_image_source() -> String {
    "generate".into()
}
fn default_image_search_suffix() -> String {
    "عکس site:.ir".into()
}
fn default_image_candidates() -> usize {
    20
}
fn default_image_model() -> String {
    "dall-e-3".into()
}
fn default_image_size() -> String {
    "1024x1024".into()
}
fn default_image_batch() -> usize {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            web_search: true,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_ms: default_retry_base_ms(),
            cap_ms: default_retry_cap_ms(),
            attempts: default_retry_attempts(),
        }
    }
}

impl Default for WordPressConfig {
    fn default() -> Self {
        Self {
            site_url: String::new(),
            username: String::new(),
            password: String::new(),
            post_status: default_post_status(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            google_api_key: String::new(),
            google_cse_id: String::new(),
            pages: default_research_pages(),
            batch_size: default_batch_size(),
            excluded_domains: default_excluded_domains(),
            excerpt_chars: default_excerpt_chars(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            program: default_scorer_program(),
            script: default_scorer_script(),
            suppressed: Vec::new(),
        }
    }
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: default_max_iterations(),
            max_problems: default_max_problems(),
            repair_attempts: default_repair_attempts(),
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: default_image_source(),
            search_suffix: default_image_search_suffix(),
            search_candidates: default_image_candidates(),
            model: default_image_model(),
            size: default_image_size(),
            batch_size: default_image_batch(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            locale: default_locale(),
            output_dir: String::new(),
            related_articles: Vec::new(),
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            wordpress: WordPressConfig::default(),
            research: ResearchConfig::default(),
            scorer: ScorerConfig::default(),
            optimize: OptimizeConfig::default(),
            images: ImagesConfig::default(),
        }
    }
}

// -- Config impl ---------------------------------------------------------

impl Config {
    /// Load config from the given path, or the default XDG config location,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        let mut config = if config_path.exists() {
            info!("loading config from {}", config_path.display());
            let contents = std::fs::read_to_string(&config_path).map_err(AutoblogError::Io)?;
            toml::from_str(&contents)
                .map_err(|e| AutoblogError::Config(format!("parse error: {e}")))?
        } else {
            info!("no config file found, using defaults");
            Config::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Overlay environment variables on top of file values.  `lookup` is
    /// injected so tests do not touch the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, name: &str| {
            if let Some(v) = lookup(name).filter(|v| !v.is_empty()) {
                *target = v;
            }
        };

        set(&mut self.keyword, "KEYPHRASE");
        set(&mut self.llm.backend, "LLM_BACKEND");
        set(&mut self.llm.api_key, "OPENAI_API_KEY");
        set(&mut self.llm.model, "OPENAI_MODEL");
        set(&mut self.wordpress.site_url, "SITE_URL");
        set(&mut self.wordpress.username, "WP_API_USER");
        set(&mut self.wordpress.password, "WP_API_PASS");
        set(&mut self.research.google_api_key, "GOOGLE_API_KEY");
        set(&mut self.research.google_cse_id, "GOOGLE_CSE_ID");

        if let Some(ids) = lookup("RELATED_ARTICLE_IDS").filter(|v| !v.is_empty()) {
            self.related_articles = ids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    /// Fail with every missing required setting at once.
    pub fn validate(&self) -> Result<()> {
        if self.images.enabled && !matches!(self.images.source.as_str(), "generate" | "search") {
            return Err(AutoblogError::Config(format!(
                "unknown image source \"{}\" — available: [generate, search]",
                self.images.source
            )));
        }

        let mut missing: Vec<&str> = Vec::new();
        if self.llm.api_key.is_empty() {
            missing.push("OPENAI_API_KEY");
        }
        if self.wordpress.username.is_empty() {
            missing.push("WP_API_USER");
        }
        if self.wordpress.password.is_empty() {
            missing.push("WP_API_PASS");
        }
        if self.wordpress.site_url.is_empty() {
            missing.push("SITE_URL");
        }
        if self.keyword.trim().is_empty() {
            missing.push("KEYPHRASE");
        }
        let image_search = self.images.enabled && self.images.source == "search";
        if self.research.enabled || image_search {
            if self.research.google_api_key.is_empty() {
                missing.push("GOOGLE_API_KEY");
            }
            if self.research.google_cse_id.is_empty() {
                missing.push("GOOGLE_CSE_ID");
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AutoblogError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }

    /// Returns the default config file path: `$XDG_CONFIG_HOME/autoblog/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("autoblog")
            .join("config.toml")
    }

    /// Directory for persisted article artifacts.
    pub fn output_dir(&self) -> PathBuf {
        if self.output_dir.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&self.output_dir)
        }
    }

    /// Generate the default config file contents.
    pub fn default_config_contents() -> &'static str {
        include_str!("../config.example.toml")
    }
}
