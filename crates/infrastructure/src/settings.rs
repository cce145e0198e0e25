//! Settings loading.
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. An optional TOML or JSON file
//! 3. `SESSIONKIT_*` environment variables (e.g. `SESSIONKIT_BASE_URL`)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use sessionkit_domain::{DomainError, SessionSettings};

/// Prefix of the environment variables read by [`SettingsLoader`].
pub const ENV_PREFIX: &str = "SESSIONKIT";

/// Error type for settings operations.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A source could not be read or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The merged settings failed validation.
    #[error("invalid settings: {0}")]
    Invalid(#[from] DomainError),
}

/// Builds [`SessionSettings`] from layered sources.
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
}

impl SettingsLoader {
    /// Loader reading defaults and the process environment only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also read `path`. A missing file is skipped.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Read variables from `vars` instead of the process environment.
    #[must_use]
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    /// `<config dir>/sessionkit/config.toml`, if the platform has one.
    #[must_use]
    pub fn default_file() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sessionkit").join("config.toml"))
    }

    /// Merge every layer and validate the result.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is malformed or the merged settings are
    /// not usable.
    pub fn load(&self) -> Result<SessionSettings, SettingsError> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&SessionSettings::default())?);

        if let Some(path) = &self.file {
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(self.env.clone()),
        );

        let settings: SessionSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        tracing::debug!(base_url = %settings.base_url, "settings loaded");
        Ok(settings)
    }
}

/// Load settings from defaults, `file` (if given) and the environment.
///
/// # Errors
///
/// See [`SettingsLoader::load`].
pub fn load_settings(file: Option<&Path>) -> Result<SessionSettings, SettingsError> {
    let mut loader = SettingsLoader::new();
    if let Some(path) = file {
        loader = loader.with_file(path);
    }
    loader.load()
}
