//! Configuration for cachet: TOML profiles, credential resolution, and
//! translation to the runtime types in `cachet-core`.
//!
//! Core never reads config files. It receives a pre-built [`Settings`],
//! [`TransportConfig`] and [`BackendOptions`] via [`ResolvedProfile`].

mod error;
mod logging;

pub use error::ConfigError;
pub use logging::{LOG_ENV, env_filter, init_tracing};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use cachet_api::{TlsMode, TransportConfig};
use cachet_core::{BackendOptions, FileStore, ModelCache, Settings};

const APP_NAME: &str = "cachet";
const KEYRING_SERVICE: &str = "cachet";
const CONFIG_FILE: &str = "config.toml";
const FALLBACK_PROFILE: &str = "default";

/// Prefix of environment overrides, e.g. `CACHET_DEFAULTS__TIMEOUT=5`.
pub const ENV_PREFIX: &str = "CACHET_";

// ── File layout ──────────────────────────────────────────────────────

/// Contents of `config.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is requested.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some(FALLBACK_PROFILE.into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

/// Values a profile falls back to when it leaves them unset.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// Request timeout in seconds.
    #[serde(default = "thirty_seconds")]
    pub timeout: u64,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_token_scheme")]
    pub token_scheme: String,

    #[serde(default)]
    pub persist_after_merge: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: thirty_seconds(),
            insecure: false,
            token_scheme: default_token_scheme(),
            persist_after_merge: false,
        }
    }
}

const fn thirty_seconds() -> u64 {
    30
}

fn default_token_scheme() -> String {
    cachet_core::settings::DEFAULT_TOKEN_SCHEME.into()
}

/// One named backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Base address, e.g. "https://api.example.com/v1".
    pub base_url: String,

    /// Token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable holding the token.
    pub token_env: Option<String>,

    /// Fail resolution when no token is found.
    #[serde(default)]
    pub require_token: bool,

    pub token_scheme: Option<String>,

    /// Answer requests from stub bodies.
    #[serde(default)]
    pub testing: bool,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    pub insecure: Option<bool>,

    pub timeout: Option<u64>,

    /// Where persisted partitions live. Defaults to the platform data dir.
    pub store_dir: Option<PathBuf>,

    pub persist_after_merge: Option<bool>,
}

// ── Paths ────────────────────────────────────────────────────────────

/// `config.toml` under the platform config directory.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join(CONFIG_FILE),
        |dirs| dirs.config_dir().join(CONFIG_FILE),
    )
}

/// Default root for persisted partitions, one subdirectory per profile.
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", APP_NAME, APP_NAME)
}

fn home_fallback(sub: &str) -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join(sub)
        .join(APP_NAME)
}

// ── Loading and saving ───────────────────────────────────────────────

/// [`load_config_from`] on [`config_path`].
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (missing file is fine) merged with `CACHET_` variables.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    debug!(path = %path.display(), profiles = config.profiles.len(), "configuration loaded");
    Ok(config)
}

/// Like [`load_config`], but an unreadable file yields [`Config::default`].
pub fn load_config_or_default() -> Config {
    match load_config() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "ignoring unreadable configuration");
            Config::default()
        }
    }
}

pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}

// ── Profiles ─────────────────────────────────────────────────────────

/// Requested name, else the configured default, else `"default"`.
pub fn active_profile_name(requested: Option<&str>, config: &Config) -> String {
    requested
        .or(config.default_profile.as_deref())
        .unwrap_or(FALLBACK_PROFILE)
        .to_owned()
}

/// Everything needed to build a backend for one profile.
#[derive(Debug)]
pub struct ResolvedProfile {
    pub name: String,
    pub settings: Settings,
    pub transport: TransportConfig,
    pub options: BackendOptions,
    pub store_dir: PathBuf,
}

impl ResolvedProfile {
    pub fn open_store(&self) -> Result<FileStore, ConfigError> {
        Ok(FileStore::open(&self.store_dir)?)
    }

    /// A model cache persisting to this profile's store directory.
    pub fn open_cache(&self) -> Result<ModelCache, ConfigError> {
        Ok(ModelCache::new(Arc::new(self.open_store()?)))
    }
}

/// Translate the named profile into runtime types.
///
/// This is the single boundary where config types cross into core types.
pub fn resolve_profile(config: &Config, name: &str) -> Result<ResolvedProfile, ConfigError> {
    resolve_profile_with(config, name, keyring_token)
}

/// [`resolve_profile`] with `keyring` standing in for the system keyring.
pub fn resolve_profile_with(
    config: &Config,
    name: &str,
    keyring: impl FnOnce(&str) -> Option<String>,
) -> Result<ResolvedProfile, ConfigError> {
    let profile = config
        .profiles
        .get(name)
        .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })?;

    // 1. Base address
    let base_url: Url = profile.base_url.parse().map_err(|_| ConfigError::Validation {
        field: "base_url".into(),
        reason: format!("invalid URL: {}", profile.base_url),
    })?;

    // 2. Credential
    let token = resolve_token_with(profile, name, keyring);
    if token.is_none() && profile.require_token {
        return Err(ConfigError::NoCredentials {
            profile: name.into(),
        });
    }

    let settings = Settings {
        base_url: Some(base_url),
        token,
        token_scheme: profile
            .token_scheme
            .clone()
            .unwrap_or_else(|| config.defaults.token_scheme.clone()),
        testing: profile.testing,
    };

    // 3. TLS verification
    let tls = if profile.insecure.unwrap_or(config.defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else {
        profile
            .ca_cert
            .clone()
            .map_or(TlsMode::System, TlsMode::CustomCa)
    };

    // 4. Timeout
    let timeout = Duration::from_secs(profile.timeout.unwrap_or(config.defaults.timeout));

    let options = BackendOptions {
        persist_after_merge: profile
            .persist_after_merge
            .unwrap_or(config.defaults.persist_after_merge),
    };

    let store_dir = profile
        .store_dir
        .clone()
        .unwrap_or_else(|| data_dir().join(name));

    Ok(ResolvedProfile {
        name: name.into(),
        settings,
        transport: TransportConfig { tls, timeout },
        options,
        store_dir,
    })
}

// ── Tokens ───────────────────────────────────────────────────────────

/// First token found in: the profile's `token_env` variable, the keyring
/// entry for `profile_name`, the plaintext `token` field.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_token_with(profile, profile_name, keyring_token)
}

/// [`resolve_token`] with `keyring` standing in for the system keyring.
pub fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    keyring: impl FnOnce(&str) -> Option<String>,
) -> Option<SecretString> {
    profile
        .token_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .or_else(|| keyring(profile_name))
        .or_else(|| profile.token.clone())
        .map(SecretString::from)
}

/// The token stored in the system keyring for `profile_name`, if any.
pub fn keyring_token(profile_name: &str) -> Option<String> {
    keyring_entry(profile_name)
        .and_then(|entry| entry.get_password())
        .ok()
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Validation {
            field: "token".into(),
            reason: format!("keyring: {e}"),
        })
}

fn keyring_entry(profile_name: &str) -> keyring::Result<keyring::Entry> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
}
