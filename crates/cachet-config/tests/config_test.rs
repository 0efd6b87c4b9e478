#![allow(clippy::unwrap_used)]

use std::path::PathBuf;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

use cachet_api::TlsMode;
use cachet_config::{
    Config, ConfigError, Profile, ResolvedProfile, active_profile_name, load_config_from,
    resolve_profile_with, resolve_token_with, save_config_to,
};

const SAMPLE: &str = r#"
default_profile = "staging"

[defaults]
timeout = 10
persist_after_merge = true

[profiles.staging]
base_url = "https://staging.example.com/api"
token = "plain-token"
token_env = "CACHET_TEST_TOKEN_THAT_IS_NEVER_SET"

[profiles.local]
base_url = "https://localhost:8443"
insecure = true
token_scheme = "Token"
testing = true
timeout = 2
persist_after_merge = false
store_dir = "/tmp/cachet-local"

[profiles.secure]
base_url = "https://secure.example.com"
ca_cert = "/etc/cachet/ca.pem"
require_token = true
"#;

fn no_keyring(_: &str) -> Option<String> {
    None
}

fn resolve_profile(config: &Config, name: &str) -> Result<ResolvedProfile, ConfigError> {
    resolve_profile_with(config, name, no_keyring)
}

fn sample() -> Config {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    load_config_from(&path).unwrap()
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.default_profile.as_deref(), Some("default"));
    assert_eq!(config.defaults.timeout, 30);
    assert_eq!(config.defaults.token_scheme, "Bearer");
    assert!(config.profiles.is_empty());
}

#[test]
fn profile_inherits_defaults() {
    let config = sample();
    let resolved = resolve_profile(&config, "staging").unwrap();

    assert_eq!(
        resolved.settings.base_url.as_ref().map(url::Url::as_str),
        Some("https://staging.example.com/api")
    );
    assert_eq!(resolved.settings.token_scheme, "Bearer");
    assert!(!resolved.settings.testing);
    assert_eq!(resolved.transport.timeout, Duration::from_secs(10));
    assert_eq!(resolved.transport.tls, TlsMode::System);
    assert!(resolved.options.persist_after_merge);
    assert!(resolved.store_dir.ends_with("staging"));
}

#[test]
fn plaintext_token_is_the_last_resort() {
    let config = sample();
    let resolved = resolve_profile(&config, "staging").unwrap();

    let token = resolved.settings.token.unwrap();
    assert_eq!(token.expose_secret(), "plain-token");
}

#[test]
fn keyring_token_beats_plaintext() {
    let config = sample();
    let profile = &config.profiles["staging"];

    let token = resolve_token_with(profile, "staging", |name| {
        assert_eq!(name, "staging");
        Some("from-keyring".into())
    })
    .unwrap();
    assert_eq!(token.expose_secret(), "from-keyring");

    let bare = Profile::default();
    assert!(resolve_token_with(&bare, "bare", no_keyring).is_none());
}

#[test]
fn keyring_token_satisfies_required_token() {
    let config = sample();
    let resolved =
        resolve_profile_with(&config, "secure", |_| Some("kept-in-keyring".into())).unwrap();
    assert_eq!(
        resolved.settings.token.unwrap().expose_secret(),
        "kept-in-keyring"
    );
}

#[test]
fn profile_overrides_win() {
    let config = sample();
    let resolved = resolve_profile(&config, "local").unwrap();

    assert_eq!(resolved.settings.token_scheme, "Token");
    assert!(resolved.settings.testing);
    assert_eq!(resolved.transport.tls, TlsMode::DangerAcceptInvalid);
    assert_eq!(resolved.transport.timeout, Duration::from_secs(2));
    assert!(!resolved.options.persist_after_merge);
    assert_eq!(resolved.store_dir, PathBuf::from("/tmp/cachet-local"));
}

#[test]
fn custom_ca_and_required_token() {
    let config = sample();
    let err = resolve_profile(&config, "secure").unwrap_err();
    assert!(matches!(err, ConfigError::NoCredentials { ref profile } if profile == "secure"));

    let mut config = sample();
    config.profiles.get_mut("secure").unwrap().token = Some("t".into());
    let resolved = resolve_profile(&config, "secure").unwrap();
    assert_eq!(
        resolved.transport.tls,
        TlsMode::CustomCa(PathBuf::from("/etc/cachet/ca.pem"))
    );
}

#[test]
fn unknown_profile_and_bad_url_are_rejected() {
    let mut config = sample();
    assert!(matches!(
        resolve_profile(&config, "prod"),
        Err(ConfigError::UnknownProfile { .. })
    ));

    config.profiles.insert(
        "broken".into(),
        Profile {
            base_url: "not a url".into(),
            ..Profile::default()
        },
    );
    assert!(matches!(
        resolve_profile(&config, "broken"),
        Err(ConfigError::Validation { ref field, .. }) if field == "base_url"
    ));
}

#[test]
fn active_profile_prefers_request_then_default() {
    let config = sample();
    assert_eq!(active_profile_name(Some("local"), &config), "local");
    assert_eq!(active_profile_name(None, &config), "staging");

    let bare = Config {
        default_profile: None,
        ..Config::default()
    };
    assert_eq!(active_profile_name(None, &bare), "default");
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    save_config_to(&sample(), &path).unwrap();
    let reloaded = load_config_from(&path).unwrap();

    assert_eq!(reloaded.default_profile.as_deref(), Some("staging"));
    assert_eq!(reloaded.profiles.len(), 3);
    assert_eq!(reloaded.profiles["local"].timeout, Some(2));
}

#[test]
fn resolved_profile_opens_a_file_backed_cache() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sample();
    config.profiles.get_mut("local").unwrap().store_dir = Some(dir.path().join("store"));

    let resolved = resolve_profile(&config, "local").unwrap();
    let cache = resolved.open_cache().unwrap();
    cache.save().unwrap();

    assert!(dir.path().join("store").is_dir());
}
