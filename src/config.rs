use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            max_output_tokens: default_max_output_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_output_tokens() -> u32 {
    700
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum rendered characters per synthesis chunk.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

fn default_max_chunk_chars() -> usize {
    12_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptConfig {
    /// Preferred caption language (BCP-47 primary subtag).
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    #[serde(default = "default_github_api_base")]
    pub api_base: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    /// Total bytes of text content fetched across all files.
    #[serde(default = "default_content_budget_bytes")]
    pub content_budget_bytes: u64,
    /// Per-file cap; larger files stay tree-only.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api_base(),
            token_env: default_github_token_env(),
            content_budget_bytes: default_content_budget_bytes(),
            max_file_bytes: default_max_file_bytes(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_content_budget_bytes() -> u64 {
    256 * 1024
}
fn default_max_file_bytes() -> u64 {
    1024 * 1024
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_capacities_api_base")]
    pub api_base: String,
    /// Environment variable holding the Capacities API key.
    #[serde(default = "default_capacities_key_env")]
    pub api_key_env: String,
    /// Target space identifier.
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: default_capacities_api_base(),
            api_key_env: default_capacities_key_env(),
            space_id: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_capacities_api_base() -> String {
    "https://api.capacities.io".to_string()
}
fn default_capacities_key_env() -> String {
    "CAPACITIES_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Overall deadline for one run, extraction through synthesis.
    #[serde(default = "default_overall_timeout_secs")]
    pub overall_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            overall_timeout_secs: default_overall_timeout_secs(),
        }
    }
}

fn default_overall_timeout_secs() -> u64 {
    600
}

impl Config {
    /// A config with all defaults, for commands that run without a
    /// config file and for tests.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chunk_chars == 0 {
        anyhow::bail!("chunking.max_chunk_chars must be > 0");
    }

    if config.model.max_output_tokens == 0 {
        anyhow::bail!("model.max_output_tokens must be > 0");
    }

    if config.repository.content_budget_bytes == 0 {
        anyhow::bail!("repository.content_budget_bytes must be > 0");
    }

    if config.export.enabled && config.export.space_id.is_none() {
        anyhow::bail!("export.space_id must be set when export is enabled");
    }

    for pattern in config
        .repository
        .include_globs
        .iter()
        .chain(&config.repository.exclude_globs)
    {
        globset::Glob::new(pattern)
            .with_context(|| format!("invalid repository glob pattern: {}", pattern))?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.model.name, "gpt-4o-mini");
        assert_eq!(config.transcript.language, "en");
        assert_eq!(config.chunking.max_chunk_chars, 12_000);
        assert!(!config.export.enabled);
    }

    #[test]
    fn test_partial_override() {
        let file = write_config(
            r#"
[transcript]
language = "es"

[repository]
content_budget_bytes = 1000
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.transcript.language, "es");
        assert_eq!(config.repository.content_budget_bytes, 1000);
        // Untouched sections keep defaults
        assert_eq!(config.repository.max_file_bytes, 1024 * 1024);
    }

    #[test]
    fn test_export_requires_space_id() {
        let file = write_config("[export]\nenabled = true\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let file = write_config("[repository]\nexclude_globs = [\"src/[\"]\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_zero_chunk_budget_rejected() {
        let file = write_config("[chunking]\nmax_chunk_chars = 0\n");
        assert!(load_config(file.path()).is_err());
    }
}
