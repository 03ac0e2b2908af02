use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_WECHAT_TOKEN: &str = "opsangel";
pub const DEFAULT_API_BASE_URL: &str = "https://api.xzdbd.com/v1";
pub const DEFAULT_SEARCH_PROVIDER: &str = "google";
pub const DEFAULT_SEARCH_RESULT_COUNT: usize = 3;
pub const DEFAULT_SEARCH_PIC_URL: &str = "https://upload.wikimedia.org/wikipedia/commons/thumb/5/53/Google_%22G%22_Logo.svg/200px-Google_%22G%22_Logo.svg.png";
pub const DEFAULT_HOME_STORE_PATH: &str = "~/.opsangel/userhome.toml";
pub const DEFAULT_REPLY_DEADLINE_MS: u64 = 4500;

const ENV_WECHAT_TOKEN: &str = "OPSANGEL_WECHAT_TOKEN";
const ENV_API_USER: &str = "OPSANGEL_API_USER";
const ENV_API_PASSWORD: &str = "OPSANGEL_API_PASSWORD";

/// Top-level configuration, read once at startup and shared read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub wechat: WeChatConfig,
    pub api: ApiConfig,
    pub tools: ToolsConfig,
    pub security: SecurityConfig,
    pub store: StoreConfig,
    pub observability: ObservabilityConfig,

    /// Where this config was loaded from; not serialized.
    #[serde(skip)]
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on the health and metrics endpoints.
    pub request_timeout_secs: u64,
    /// Time budget for answering one webhook message, shared by every backend
    /// call the command makes. Must stay under the platform's ~5 s window.
    pub reply_deadline_ms: u64,
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 10,
            reply_deadline_ms: DEFAULT_REPLY_DEADLINE_MS,
            max_body_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeChatConfig {
    /// Shared secret configured on the Official-Account admin console.
    pub token: String,
}

impl Default for WeChatConfig {
    fn default() -> Self {
        Self {
            token: DEFAULT_WECHAT_TOKEN.to_string(),
        }
    }
}

/// Backing REST API that fronts search, orchestration and maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            user: String::new(),
            password: String::new(),
            timeout_secs: 4,
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub search_provider: String,
    pub search_result_count: usize,
    pub search_pic_url: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            search_provider: DEFAULT_SEARCH_PROVIDER.to_string(),
            search_result_count: DEFAULT_SEARCH_RESULT_COUNT,
            search_pic_url: DEFAULT_SEARCH_PIC_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Sender ids allowed to start, stop or redeploy services.
    pub privileged_users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub home_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            home_path: DEFAULT_HOME_STORE_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads the config at `path`, or the default location when `None`.
    ///
    /// A missing file is not an error: defaults plus environment overrides
    /// are enough to run. This runs before logging is up, so callers report
    /// where the config came from via [`Config::file_exists`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => expand_path(&path.to_string_lossy()),
            None => default_config_path(),
        };

        let mut config = if config_path.exists() {
            let raw = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read config {}", config_path.display()))?;
            Self::from_toml(&raw)
                .with_context(|| format!("failed to parse config {}", config_path.display()))?
        } else {
            Self::default()
        };

        config.config_path = config_path;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Applies secrets from the environment. `lookup` is injectable for tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = non_empty(ENV_WECHAT_TOKEN) {
            self.wechat.token = token;
        }
        if let Some(user) = non_empty(ENV_API_USER) {
            self.api.user = user;
        }
        if let Some(password) = non_empty(ENV_API_PASSWORD) {
            self.api.password = password;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.wechat.token.trim().is_empty() {
            anyhow::bail!("wechat.token must not be empty");
        }
        if self.gateway.reply_deadline_ms == 0 {
            anyhow::bail!("gateway.reply_deadline_ms must be greater than 0");
        }
        let base = self.api.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            anyhow::bail!("api.base_url must be an http(s) URL, got '{base}'");
        }
        Ok(())
    }

    pub fn file_exists(&self) -> bool {
        self.config_path.is_file()
    }

    pub fn home_store_path(&self) -> PathBuf {
        expand_path(&self.store.home_path)
    }

    /// Copy that is safe to print.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.api.password.is_empty() {
            copy.api.password = "***".to_string();
        }
        copy.wechat.token = "***".to_string();
        copy
    }
}

fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "opsangel")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
}
