use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::admin::{AdminGate, DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME};
use crate::persona::{DEFAULT_MAX_SESSION_SECS, DEFAULT_PERSONA_NAME, DEFAULT_SYSTEM_PROMPT, PersonaConfig};
use crate::session::{DEFAULT_GREETING, SessionSettings};
use crate::upload::{DEFAULT_MAX_UPLOAD_BYTES, UploadPolicy};

// ── Persona table ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaProfile {
    /// Endpoint that mints avatar session tokens
    pub token_url: Option<String>,
    /// Bearer key for `token_url`. Falls back to $LOANDESK_PERSONA_API_KEY.
    pub api_key: Option<String>,
    #[serde(default = "default_persona_name")]
    pub name: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_session_secs")]
    pub max_session_secs: u32,
    pub avatar_id: Option<String>,
    pub voice_id: Option<String>,
    pub llm_id: Option<String>,
}

fn default_persona_name() -> String {
    DEFAULT_PERSONA_NAME.to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_max_session_secs() -> u32 {
    DEFAULT_MAX_SESSION_SECS
}

impl Default for PersonaProfile {
    fn default() -> Self {
        Self {
            token_url: None,
            api_key: None,
            name: default_persona_name(),
            system_prompt: default_system_prompt(),
            max_session_secs: default_max_session_secs(),
            avatar_id: None,
            voice_id: None,
            llm_id: None,
        }
    }
}

// ── Profile ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Base URL of the loan assistant backend
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Seconds between state refreshes while a chat is open
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Per-request timeout for backend calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Language code forwarded with every chat message (e.g. "hi-IN")
    pub language: Option<String>,
    /// Upload size ceiling in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// First assistant message of a fresh chat. Empty string disables it.
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// Where downloaded sanction letters are written. Default: current directory.
    pub download_dir: Option<PathBuf>,
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    #[serde(default)]
    pub persona: PersonaProfile,
}

fn default_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_admin_username() -> String {
    DEFAULT_ADMIN_USERNAME.to_string()
}

fn default_admin_password() -> String {
    DEFAULT_ADMIN_PASSWORD.to_string()
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            language: None,
            max_upload_bytes: default_max_upload_bytes(),
            greeting: default_greeting(),
            download_dir: None,
            admin_username: default_admin_username(),
            admin_password: default_admin_password(),
            persona: PersonaProfile::default(),
        }
    }
}

// ── Config file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// Which profile to use when none is specified
    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl ConfigFile {
    /// Load from disk, or return a default config if the file doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    /// Write a starter config file to disk (only if it doesn't exist).
    pub fn write_default_if_missing() -> Result<PathBuf> {
        let path = config_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    fn write_default_to(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Resolve the active profile given an optional override name.
    pub fn resolve_profile(&self, name: Option<&str>) -> Option<&Profile> {
        let key = name.unwrap_or(&self.default_profile);
        self.profiles.get(key)
    }
}

// ── Resolved runtime config (after merging file + CLI overrides) ──────────────

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub endpoint: String,
    /// Profile name that was resolved (for display)
    pub profile_name: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub language: Option<String>,
    pub max_upload_bytes: u64,
    /// `None` when the profile disables the greeting
    pub greeting: Option<String>,
    pub download_dir: PathBuf,
    pub admin_username: String,
    pub admin_password: String,
    pub persona: PersonaConfig,
}

/// Command-line and environment overrides; `None` means "use the profile".
#[derive(Debug, Clone, Default)]
pub struct Overrides<'a> {
    pub profile: Option<&'a str>,
    pub endpoint: Option<&'a str>,
    pub language: Option<&'a str>,
    pub persona_api_key: Option<&'a str>,
}

impl ResolvedConfig {
    /// Merge config file profile with CLI overrides.
    /// Priority: CLI args > env vars (handled by clap) > config file profile > built-in defaults
    pub fn resolve(file: &ConfigFile, overrides: &Overrides<'_>) -> Self {
        let profile_name = overrides.profile.unwrap_or(&file.default_profile).to_string();

        let base = file.resolve_profile(overrides.profile).cloned().unwrap_or_default();
        let persona = base.persona;

        Self {
            endpoint: overrides.endpoint.map(str::to_string).unwrap_or(base.endpoint),
            profile_name,
            poll_interval: Duration::from_secs(base.poll_interval_secs.max(1)),
            request_timeout: Duration::from_secs(base.request_timeout_secs.max(1)),
            language: overrides.language.map(str::to_string).or(base.language),
            max_upload_bytes: base.max_upload_bytes,
            greeting: Some(base.greeting).filter(|g| !g.trim().is_empty()),
            download_dir: base.download_dir.unwrap_or_else(|| PathBuf::from(".")),
            admin_username: base.admin_username,
            admin_password: base.admin_password,
            persona: PersonaConfig {
                token_url: persona.token_url,
                api_key: overrides.persona_api_key.map(str::to_string).or(persona.api_key),
                name: persona.name,
                system_prompt: persona.system_prompt,
                max_session_secs: persona.max_session_secs,
                avatar_id: persona.avatar_id,
                voice_id: persona.voice_id,
                llm_id: persona.llm_id,
            },
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            poll_interval: self.poll_interval,
            language: self.language.clone(),
            greeting: self.greeting.clone(),
            upload: UploadPolicy::new(self.max_upload_bytes),
        }
    }

    pub fn admin_gate(&self) -> AdminGate {
        AdminGate::new(self.admin_username.clone(), self.admin_password.clone())
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn config_path() -> PathBuf {
    dirs_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loandesk")
        .join("config.toml")
}

fn dirs_config_dir() -> Option<PathBuf> {
    // XDG_CONFIG_HOME or ~/.config on Linux/macOS
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
}

// ── Default config template written on first run ──────────────────────────────

const DEFAULT_CONFIG_TOML: &str = r#"# loandesk configuration
# Run `loandesk --init` to regenerate this file.

default_profile = "local"

# ── Local backend (default) ───────────────────────────────────────────────────
[profiles.local]
endpoint           = "http://localhost:8000"
poll_interval_secs = 5
# request_timeout_secs = 30
# language           = "hi-IN"      # forwarded with every chat message
# max_upload_bytes   = 10485760     # 10 MiB
# download_dir       = "~/Downloads"
# greeting           = ""           # empty disables the opening assistant message

# Admin tab credentials
# admin_username = "admin"
# admin_password = "admin123"

# ── Video persona (optional) ──────────────────────────────────────────────────
# The API key may also come from $LOANDESK_PERSONA_API_KEY.
# [profiles.local.persona]
# token_url        = "https://api.anam.ai/v1/auth/session-token"
# api_key          = "..."
# name             = "Priya"
# system_prompt    = "You are a friendly personal loan advisor."
# max_session_secs = 1800

# ── Shared staging backend ────────────────────────────────────────────────────
# [profiles.staging]
# endpoint             = "https://loans-staging.example.com"
# poll_interval_secs   = 10
# request_timeout_secs = 60
"#;
