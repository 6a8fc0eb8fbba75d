//! Configuration for the athlete dashboard host.
//!
//! TOML file plus `ATHDASH_*` environment overrides, merged with figment.
//! Translates into the pieces the shell needs: a `UserContext`, a
//! `FeatureRegistry` built from the `[[features]]` list, `ShellOptions`,
//! and an optional `DashboardClient` for the data boundary.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use athdash_api::{DashboardClient, TlsMode, TransportConfig};
use athdash_core::registry::FeatureFactory;
use athdash_core::{
    FeatureDescriptor, FeatureRegistry, RegistryBuilder, ShellOptions, UserContext,
};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Prefix for environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "ATHDASH_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("failed to build API client: {0}")]
    Client(#[from] athdash_api::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Features in navigation order.
    #[serde(default = "default_features")]
    pub features: Vec<FeatureConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            user: UserConfig::default(),
            dashboard: DashboardConfig::default(),
            features: default_features(),
        }
    }
}

/// Data boundary settings. Without `base_url` the dashboard runs offline
/// and every load/save reports an error to the requesting feature.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Site root, e.g. "https://club.example.com".
    pub base_url: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// REST nonce (plaintext; prefer `nonce_env`).
    pub nonce: Option<String>,

    /// Environment variable holding the REST nonce.
    pub nonce_env: Option<String>,

    #[serde(default)]
    pub insecure: bool,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout(),
            nonce: None,
            nonce_env: None,
            insecure: false,
            ca_cert: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    #[serde(default)]
    pub id: u64,

    #[serde(default = "default_display_name")]
    pub display_name: String,

    #[serde(default = "default_role")]
    pub role: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: 0,
            display_name: default_display_name(),
            role: default_role(),
        }
    }
}

fn default_display_name() -> String {
    "Athlete".into()
}
fn default_role() -> String {
    "subscriber".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DashboardConfig {
    #[serde(default = "default_brand")]
    pub brand: String,

    #[serde(default = "default_feature")]
    pub default_feature: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            brand: default_brand(),
            default_feature: default_feature(),
        }
    }
}

fn default_brand() -> String {
    ShellOptions::default().brand
}
fn default_feature() -> String {
    athdash_core::router::DEFAULT_FEATURE.into()
}

/// One `[[features]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeatureConfig {
    pub id: String,

    pub title: String,

    pub icon: Option<String>,

    /// Navigation query; defaults to `?dashboard_feature=<id>`.
    pub route: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Roles allowed to see the feature. Empty means public.
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Component name to instantiate; defaults to the feature id.
    pub component: Option<String>,

    /// Props handed to the component factory.
    pub props: Option<Map<String, Value>>,
}

impl FeatureConfig {
    pub fn new(id: impl Into<String>, title: impl Into<String>, icon: &str) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            icon: Some(icon.into()),
            route: None,
            enabled: true,
            permissions: Vec::new(),
            component: None,
            props: None,
        }
    }

    pub fn component_name(&self) -> &str {
        self.component.as_deref().unwrap_or(&self.id)
    }

    /// Build the registry descriptor around a component factory.
    pub fn descriptor(&self, factory: FeatureFactory) -> FeatureDescriptor {
        let mut descriptor =
            FeatureDescriptor::new(self.id.clone(), self.title.clone(), move |props| {
                factory(props)
            })
            .enabled(self.enabled)
            .permissions(self.permissions.iter().cloned());
        if let Some(ref icon) = self.icon {
            descriptor = descriptor.icon(icon.clone());
        }
        if let Some(ref route) = self.route {
            descriptor = descriptor.route(route.clone());
        }
        if let Some(ref props) = self.props {
            descriptor = descriptor.props(Value::Object(props.clone()));
        }
        descriptor
    }
}

fn default_enabled() -> bool {
    true
}

fn default_features() -> Vec<FeatureConfig> {
    vec![
        FeatureConfig::new("overview", "Overview", "◉"),
        FeatureConfig::new("profile", "Profile", "☺"),
        FeatureConfig::new("workout-tracker", "Workout Tracker", "⚑"),
        FeatureConfig::new("training-persona", "Training Persona", "★"),
    ]
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "athdash", "athdash").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("athdash");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults plus
/// any environment overrides.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    debug!(
        path = %path.display(),
        features = config.features.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Load config, falling back to the defaults when it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|err| {
        warn!(error = %err, "using default configuration");
        Config::default()
    })
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Validation ──────────────────────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref base) = self.api.base_url {
            url::Url::parse(base)
                .map_err(|e| ConfigError::validation("api.base_url", format!("{base}: {e}")))?;
        }

        let mut seen = HashSet::new();
        for feature in &self.features {
            if feature.id.trim().is_empty() {
                return Err(ConfigError::validation(
                    "features.id",
                    format!("feature '{}' has an empty id", feature.title),
                ));
            }
            if !seen.insert(feature.id.as_str()) {
                return Err(ConfigError::validation(
                    "features.id",
                    format!("duplicate feature id '{}'", feature.id),
                ));
            }
        }
        Ok(())
    }
}

// ── Translation ─────────────────────────────────────────────────────

impl ApiConfig {
    /// Resolve the nonce: `nonce_env` lookup first, then plaintext.
    pub fn resolve_nonce(&self) -> Option<SecretString> {
        if let Some(ref env_name) = self.nonce_env {
            if let Ok(val) = std::env::var(env_name) {
                return Some(SecretString::from(val));
            }
        }
        self.nonce.clone().map(SecretString::from)
    }

    pub fn transport(&self) -> TransportConfig {
        let tls = if self.insecure {
            TlsMode::DangerAcceptInvalid
        } else if let Some(ref ca_path) = self.ca_cert {
            TlsMode::CustomCa(ca_path.clone())
        } else {
            TlsMode::System
        };
        TransportConfig::default()
            .with_tls(tls)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }

    /// `None` when no `base_url` is configured.
    pub fn client(&self) -> Result<Option<DashboardClient>, ConfigError> {
        let Some(ref base) = self.base_url else {
            return Ok(None);
        };
        let nonce = self.resolve_nonce();
        let client = DashboardClient::new(base, nonce.as_ref(), &self.transport())?;
        Ok(Some(client))
    }
}

impl Config {
    pub fn user_context(&self) -> UserContext {
        UserContext::new(
            self.user.id,
            self.user.display_name.clone(),
            self.user.role.clone(),
        )
    }

    pub fn shell_options(&self) -> ShellOptions {
        ShellOptions {
            brand: self.dashboard.brand.clone(),
            default_feature: self.dashboard.default_feature.clone(),
        }
    }

    /// Build the registry in `[[features]]` order. Entries whose component
    /// has no factory are logged and skipped.
    pub fn build_registry<F>(&self, components: F) -> FeatureRegistry
    where
        F: Fn(&str) -> Option<FeatureFactory>,
    {
        let mut builder = RegistryBuilder::new(self.user_context());
        for feature in &self.features {
            let component = feature.component_name();
            match components(component) {
                Some(factory) => {
                    builder.register(feature.descriptor(factory));
                }
                None => {
                    warn!(feature = %feature.id, component, "unknown component, feature skipped");
                }
            }
        }
        builder.build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_register_the_four_features() {
        let config = Config::default();
        let ids: Vec<_> = config.features.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["overview", "profile", "workout-tracker", "training-persona"]
        );
        assert_eq!(config.dashboard.default_feature, "overview");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_and_empty_ids_are_rejected() {
        let mut config = Config::default();
        config.features.push(FeatureConfig::new("profile", "Again", "☺"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref reason, .. }) if reason.contains("duplicate")
        ));

        let mut config = Config::default();
        config.features[0].id = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref reason, .. }) if reason.contains("empty id")
        ));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let mut config = Config::default();
        config.api.base_url = Some("club dot example".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "api.base_url"
        ));
    }

    #[test]
    fn transport_follows_tls_settings() {
        let mut api = ApiConfig::default();
        assert!(matches!(api.transport().tls, TlsMode::System));
        assert_eq!(api.transport().timeout, Duration::from_secs(30));

        api.ca_cert = Some(PathBuf::from("/etc/ssl/club.pem"));
        assert!(matches!(api.transport().tls, TlsMode::CustomCa(_)));

        api.insecure = true;
        assert!(matches!(api.transport().tls, TlsMode::DangerAcceptInvalid));
    }

    #[test]
    fn offline_without_base_url() {
        assert!(ApiConfig::default().client().unwrap().is_none());

        let api = ApiConfig {
            base_url: Some("https://club.example.com".into()),
            nonce: Some("abc123".into()),
            ..ApiConfig::default()
        };
        assert!(api.resolve_nonce().is_some());
        let client = api.client().unwrap().unwrap();
        assert_eq!(client.base_url().as_str(), "https://club.example.com/");
    }
}
