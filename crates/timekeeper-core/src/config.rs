use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Google's OpenID JWKS endpoint used to verify inbound identity tokens.
pub const DEFAULT_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Top-level config (timekeeper.toml + TIMEKEEPER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimekeeperConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub remote: RemoteSettings,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Settings for the remote scheduler/queue provider.
///
/// Several fields are derivable: `root_url` and `service_account` fall back
/// to App Engine conventions for the configured project, and deferred
/// dispatch defaults to "enabled iff a queue is configured".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    pub project_id: String,
    pub region: String,
    /// App Engine service name; used when deriving `root_url`.
    #[serde(default = "default_service")]
    pub service: String,
    /// Public base URL of this deployment (scheme included). Derived from
    /// `project_id`/`service` when unset.
    pub root_url: Option<String>,
    /// Identity used for outbound OIDC tokens. Derived when unset.
    pub service_account: Option<String>,
    /// Remote queue name for deferred task dispatch. `None` disables it.
    pub queue: Option<String>,
    /// Force deferred dispatch on/off. Defaults to `queue.is_some()`.
    pub use_queue: Option<bool>,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    /// Path to a service-account JSON key file for outbound token minting.
    pub key_file: Option<String>,
}

impl RemoteSettings {
    pub fn root_url(&self) -> String {
        match &self.root_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.service == "default" => {
                format!("https://{}.appspot.com", self.project_id)
            }
            None => format!("https://{}-dot-{}.appspot.com", self.service, self.project_id),
        }
    }

    pub fn service_account(&self) -> String {
        self.service_account
            .clone()
            .unwrap_or_else(|| format!("{}@appspot.gserviceaccount.com", self.project_id))
    }

    pub fn use_queue(&self) -> bool {
        self.use_queue.unwrap_or(self.queue.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default = "default_certs_url")]
    pub certs_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::OpenId,
            certs_url: default_certs_url(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
// kebab-case so the config reads `mode = "open-id"`.
pub enum AuthMode {
    /// Verify Google OpenID bearer tokens against the JWKS endpoint.
    #[default]
    OpenId,
    /// No authentication — local development only.
    None,
}

impl TimekeeperConfig {
    /// Load from `config_path` (or `~/.timekeeper/timekeeper.toml`),
    /// then apply `TIMEKEEPER_*` env overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TimekeeperConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TIMEKEEPER_").split("__"))
            .extract()
            .map_err(|e| crate::error::TimekeeperError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.timekeeper/timekeeper.toml", home)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.timekeeper/timekeeper.db", home)
}

fn default_service() -> String {
    "default".to_string()
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_certs_url() -> String {
    DEFAULT_CERTS_URL.to_string()
}
