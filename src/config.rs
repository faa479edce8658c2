use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Config path used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "config/taskgate.toml";

/// Environment variable holding the LLM access token.
pub const TOKEN_ENV_VAR: &str = "AIPROXY_TOKEN";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
    pub llm: LlmConfig,
    pub executor: ExecutorConfig,
    pub routing: RoutingConfig,
    pub operations: OperationsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow cross-origin requests from any origin
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors: true,
        }
    }
}

/// How the sandbox decides whether a path stays under the root.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Containment {
    /// Prefix + forbidden-substring check on the raw text
    #[default]
    Lexical,
    /// Lexical check, then the resolved (symlink-free) path must stay under the root
    Canonical,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SandboxConfig {
    pub root: String,
    pub forbidden: Vec<String>,
    pub containment: Containment,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: "/data/".to_string(),
            forbidden: vec!["..".to_string(), "~".to_string()],
            containment: Containment::Lexical,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// "openai" (any OpenAI-compatible endpoint) or "anthropic"
    pub provider: String,
    pub model: String,
    /// Supports ${ENV_VAR} substitution. Empty disables the fallback path.
    pub api_key: String,
    /// Overrides the provider's default API base URL
    pub base_url: Option<String>,
    pub max_tokens_per_request: u32,
    pub timeout_secs: u64,
    pub max_concurrent: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            base_url: None,
            max_tokens_per_request: 512,
            timeout_secs: 60,
            max_concurrent: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutorConfig {
    pub timeout_secs: u64,
    pub max_output_bytes: usize,
    pub max_concurrent: usize,
    /// Run model replies that need a shell (pipes, quotes, redirections)
    pub allow_raw_shell: bool,
    /// Programs a synthesized command may start. Empty allows any.
    pub allowed_programs: Vec<String>,
    pub shell: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_output_bytes: 1024 * 1024,
            max_concurrent: 4,
            allow_raw_shell: true,
            allowed_programs: Vec::new(),
            shell: "sh".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RoutingConfig {
    pub case_insensitive: bool,
}

/// Arguments bound to the builtin operations.
///
/// Task text only selects an operation; these values decide what it acts on.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OperationsConfig {
    pub fetch_url: String,
    pub fetch_output: String,
    pub clone_url: String,
    pub clone_dest: String,
    pub sql_db: String,
    pub sql_query: String,
    pub sql_output: String,
    pub scrape_url: String,
    pub scrape_output: String,
    /// "html" keeps the page markup, "text" renders readable text
    pub scrape_format: String,
    pub audio_input: String,
    pub audio_output: String,
    pub markdown_input: String,
    pub markdown_output: String,
    pub csv_input: String,
    pub csv_output: String,
    /// `column=value`
    pub csv_condition: String,
    pub dates_input: String,
    pub dates_output: String,
    pub weekday: String,
    pub contacts_input: String,
    pub contacts_output: String,
    pub logs_dir: String,
    pub logs_output: String,
    pub logs_count: usize,
    pub tickets_db: String,
    pub tickets_type: String,
    pub tickets_output: String,
    pub docs_dir: String,
    pub docs_index_output: String,
    pub email_input: String,
    pub email_output: String,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            fetch_url: "https://api.example.com/data".to_string(),
            fetch_output: "/data/fetched_data.json".to_string(),
            clone_url: "https://github.com/example/repo.git".to_string(),
            clone_dest: "/data/repo".to_string(),
            sql_db: "/data/database.db".to_string(),
            sql_query: "SELECT * FROM sqlite_master;".to_string(),
            sql_output: "/data/query_output.json".to_string(),
            scrape_url: "https://example.com".to_string(),
            scrape_output: "/data/scraped_content.html".to_string(),
            scrape_format: "html".to_string(),
            audio_input: "/data/audio.mp3".to_string(),
            audio_output: "/data/transcription.txt".to_string(),
            markdown_input: "/data/docs/file.md".to_string(),
            markdown_output: "/data/docs/file.html".to_string(),
            csv_input: "/data/input.csv".to_string(),
            csv_output: "/data/output.json".to_string(),
            csv_condition: "status=active".to_string(),
            dates_input: "/data/dates.txt".to_string(),
            dates_output: "/data/dates-wednesdays.txt".to_string(),
            weekday: "Wednesday".to_string(),
            contacts_input: "/data/contacts.json".to_string(),
            contacts_output: "/data/contacts-sorted.json".to_string(),
            logs_dir: "/data/logs".to_string(),
            logs_output: "/data/logs-recent.txt".to_string(),
            logs_count: 10,
            tickets_db: "/data/ticket-sales.db".to_string(),
            tickets_type: "Gold".to_string(),
            tickets_output: "/data/ticket-sales-gold.txt".to_string(),
            docs_dir: "/data/docs".to_string(),
            docs_index_output: "/data/docs/index.json".to_string(),
            email_input: "/data/email.txt".to_string(),
            email_output: "/data/email-sender.txt".to_string(),
        }
    }
}

impl LlmConfig {
    /// The fallback path only runs with a token configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {path}"))?;
        let mut config = Self::parse(&content)?;
        config.apply_env_token();
        Ok(config)
    }

    /// Loads `path`, or built-in defaults when the default config file is missing.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if path == DEFAULT_CONFIG_PATH && !Path::new(path).exists() {
            let mut config = Self::default();
            config.apply_env_token();
            return Ok(config);
        }
        Self::load(path)
    }

    /// Parses TOML after expanding ${ENV_VAR} references. Unset variables expand to "".
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let expanded = shellexpand::env_with_context_no_errors(content, |var| {
            Some(std::env::var(var).unwrap_or_default())
        });
        let config: Config = toml::from_str(&expanded).context("Invalid config file")?;
        Ok(config)
    }

    fn apply_env_token(&mut self) {
        if !self.llm.has_api_key() {
            if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
                self.llm.api_key = token;
            }
        }
    }
}
