use anyhow::{Context, Result};
use relay_core::{ChildAgentRegistry, HandlerMode, RouterConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

// ── Store Config ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// SQLite database file; `~/` is expanded
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "~/.relay/state.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }
}

// ── Gateway Config ──────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token required on every request; empty disables auth
    #[serde(default)]
    pub auth_token: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind", &self.bind)
            .field("auth_token", &mask_secret(&self.auth_token))
            .finish()
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_token: String::new(),
        }
    }
}

/// Mask a secret string for safe display in Debug output / logs.
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relay")
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}

impl RelayConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // The file may hold the gateway token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `relay init` first.",
                path.display()
            )
        })?;

        let mut config = Self::parse(&content, |name| std::env::var(name).ok())
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        config.apply_env_overrides(|name| std::env::var(name).ok())?;

        if !config.gateway.auth_token.is_empty() && !content.contains("${RELAY_GATEWAY_TOKEN}") {
            warn!(
                "Gateway token is hardcoded in config file. For security, use environment variables: auth_token = \"${{RELAY_GATEWAY_TOKEN}}\""
            );
        }

        Ok(config)
    }

    /// Parse TOML after expanding allowlisted `${VAR}` references
    pub fn parse(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let expanded = expand_env_vars(content, &lookup);
        let config: Self = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.gateway.auth_token.is_empty() {
            config.gateway.auth_token = mask_secret(&config.gateway.auth_token);
        }
        config
    }

    /// Apply `CHILD_AGENTS` (JSON object) and `STATE_TABLE` from the environment
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup("CHILD_AGENTS").filter(|v| !v.trim().is_empty()) {
            self.router.child_agents = ChildAgentRegistry::from_json(&raw)
                .context("CHILD_AGENTS is not a valid agent registry")?;
            info!(
                "Loaded {} child agents from CHILD_AGENTS",
                self.router.child_agents.len()
            );
        }
        if let Some(table) = lookup("STATE_TABLE").filter(|v| !v.trim().is_empty()) {
            info!("Using state table '{}' from STATE_TABLE", table);
            self.router.state_table = table;
        }
        Ok(())
    }

    pub fn mode(&self) -> HandlerMode {
        self.router.mode
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &["RELAY_GATEWAY_TOKEN", "HOME", "USER"];

fn expand_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + len];
        result.push_str(&rest[..start]);
        if ALLOWED_ENV_VARS.contains(&var_name) {
            result.push_str(&lookup(var_name).unwrap_or_default());
        } else {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            result.push_str(&rest[start..start + len + 1]);
        }
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}
