use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Shared-secret token gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Request header carrying the token.
    #[serde(default = "default_auth_header")]
    pub header: String,
    /// Valid tokens mapped to the principal they identify.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

fn default_auth_header() -> String {
    "x-skillbot-token".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            header: default_auth_header(),
            tokens: HashMap::new(),
        }
    }
}

impl AuthConfig {
    /// The gateway refuses to start without at least one token.
    pub fn validate_for_gateway(&self) -> Result<(), ConfigError> {
        if self.tokens.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.tokens is empty; configure at least one token".into(),
            ));
        }
        if let Some((_, principal)) = self.tokens.iter().find(|(t, p)| t.is_empty() || p.is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "auth.tokens contains an empty token or principal (principal: {principal:?})"
            )));
        }
        Ok(())
    }
}

/// Reasoning loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Agent name used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,
    /// Optional system prompt placed before the user's message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Maximum reasoning/acting cycles per invocation.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Upper bound on a single model call.
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,
}

fn default_agent_name() -> String {
    "skill-agent".to_string()
}

fn default_max_steps() -> usize {
    10
}

fn default_model_timeout_secs() -> u64 {
    120
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt: Some("You are a helpful assistant.".to_string()),
            max_steps: default_max_steps(),
            model_timeout_secs: default_model_timeout_secs(),
        }
    }
}

impl AgentSettings {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

/// Skill discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Directory scanned for skill definitions. Relative paths resolve
    /// against the working directory.
    #[serde(default = "default_skills_dir")]
    pub directory: PathBuf,
    /// Reload the skill snapshot when the directory changes.
    #[serde(default = "default_true")]
    pub watch: bool,
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from("skills")
}

fn default_true() -> bool {
    true
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            directory: default_skills_dir(),
            watch: true,
        }
    }
}

/// Shell execution limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_shell_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-stream capture cap; output beyond it is dropped and flagged.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Reject arguments whose `..` traversal leaves the tool root.
    #[serde(default = "default_true")]
    pub sanitize_args: bool,
}

fn default_shell_timeout_secs() -> u64 {
    30
}

fn default_max_output_bytes() -> usize {
    64 * 1024
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shell_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            sanitize_args: true,
        }
    }
}

impl ShellConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// File and shell tool settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Root directory the tools are confined to (defaults to the working dir).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub shell: ShellConfig,
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_base_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
}

fn default_model() -> String {
    "qwen-plus".to_string()
}

fn default_api_key_env() -> String {
    "DASHSCOPE_API_KEY".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl ModelConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Top-level skillbot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillBotConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

impl SkillBotConfig {
    /// Check every field that has no sensible zero value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_steps == 0 {
            return Err(ConfigError::Invalid("agent.max_steps must be > 0".into()));
        }
        if self.agent.model_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "agent.model_timeout_secs must be > 0".into(),
            ));
        }
        if self.tools.shell.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "tools.shell.timeout_secs must be > 0".into(),
            ));
        }
        if self.tools.shell.max_output_bytes == 0 {
            return Err(ConfigError::Invalid(
                "tools.shell.max_output_bytes must be > 0".into(),
            ));
        }
        if self.skills.directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("skills.directory is empty".into()));
        }
        if !is_valid_header_name(&self.auth.header) {
            return Err(ConfigError::Invalid(format!(
                "auth.header {:?} is not a valid HTTP header name",
                self.auth.header
            )));
        }
        if self.model.base_url.trim().is_empty() || self.model.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "model.base_url and model.model are required".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the skills directory against `working_dir`.
    pub fn skills_dir(&self, working_dir: &Path) -> PathBuf {
        resolve_against(working_dir, &self.skills.directory)
    }

    /// Resolve the tool root against `working_dir`.
    pub fn tools_root(&self, working_dir: &Path) -> PathBuf {
        match &self.tools.root {
            Some(root) => resolve_against(working_dir, root),
            None => working_dir.to_path_buf(),
        }
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// RFC 7230 token characters, lowercase-insensitive.
fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Resolve the skillbot config directory (~/.skillbot/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".skillbot"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.skillbot/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<SkillBotConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
///
/// The result is validated before it is returned.
pub fn load_config_from(path: &Path) -> Result<SkillBotConfig, ConfigError> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        json5::from_str(&content)?
    } else {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        SkillBotConfig::default()
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SkillBotConfig::default();
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.auth.header, "x-skillbot-token");
        assert_eq!(config.agent.max_steps, 10);
        assert!(config.tools.shell.sanitize_args);
        config.validate().unwrap();
    }

    #[test]
    fn test_json5_parse() {
        let json5_str = r#"{
            gateway: { port: 8080 },
            auth: {
                header: "token-1",
                tokens: { "yingzi-1": "Fake_UserInfo" },
            },
            agent: { max_steps: 3 },
            skills: { directory: "/srv/skills", watch: false },
            tools: { shell: { timeout_secs: 5 } },
            some_future_section: { ignored: true },
        }"#;
        let config: SkillBotConfig = json5::from_str(json5_str).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.auth.tokens["yingzi-1"], "Fake_UserInfo");
        assert_eq!(config.agent.max_steps, 3);
        assert!(!config.skills.watch);
        assert_eq!(config.tools.shell.timeout_secs, 5);
        assert_eq!(config.tools.shell.max_output_bytes, 64 * 1024);
        config.validate().unwrap();
        config.auth.validate_for_gateway().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = SkillBotConfig::default();
        config.agent.max_steps = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_header() {
        let mut config = SkillBotConfig::default();
        config.auth.header = "bad header".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gateway_requires_tokens() {
        let config = SkillBotConfig::default();
        assert!(config.auth.validate_for_gateway().is_err());
    }

    #[test]
    fn test_paths_resolve_against_working_dir() {
        let mut config = SkillBotConfig::default();
        let wd = Path::new("/work");
        assert_eq!(config.skills_dir(wd), PathBuf::from("/work/skills"));
        assert_eq!(config.tools_root(wd), PathBuf::from("/work"));
        config.tools.root = Some(PathBuf::from("/sandbox"));
        assert_eq!(config.tools_root(wd), PathBuf::from("/sandbox"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("nope.json5")).unwrap();
        assert_eq!(config.agent.name, "skill-agent");
    }

    #[test]
    fn test_load_invalid_file_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json5");
        std::fs::write(&path, "{ agent: { max_steps: 0 } }").unwrap();
        assert!(matches!(
            load_config_from(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
