use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use tracing_subscriber::filter::LevelFilter;

use super::diagnostics::{format_diagnostics, Diagnostic, Error, LoadError, ValidationError};
use super::partial::{PartialApiConfig, PartialConfig, PartialIntegrationsConfig};
#[cfg(feature = "integration_mealie")]
use crate::integrations::mealie::MealieConfig;

pub const DEFAULT_API_LISTEN: &str = "127.0.0.1";
pub const DEFAULT_API_PORT: u16 = 8565;

#[derive(Debug, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub integrations: IntegrationsConfig,
}

/// Failure to produce a usable config
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Merge or validation errors, already formatted for display
    #[error("{0}")]
    Invalid(String),
}

// LogLevel needs Deserialize because it's used in PartialLoggingConfig with toml::Spanned
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"mealied::api" = "debug"`
    pub overrides: HashMap<String, LogLevel>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub listen: IpAddr,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_API_PORT,
        }
    }
}

#[derive(Debug, Default)]
pub struct IntegrationsConfig {
    #[cfg(feature = "integration_mealie")]
    pub mealie: Option<MealieConfig>,
}

impl Config {
    /// Load configuration from multiple TOML files with import resolution
    ///
    /// Supports several files (e.g. base + secrets), `imports` within files,
    /// conflict detection across all sources and validation with every error
    /// reported together.
    ///
    /// Returns the config plus any warnings; errors make the whole load fail.
    pub fn from_files(paths: &[PathBuf]) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let configs = PartialConfig::load_with_imports(paths)?;
        let (partial, diagnostics) = PartialConfig::merge(configs);
        Self::from_partial(partial, diagnostics)
    }

    /// Convert a PartialConfig to a Config, validating all fields
    ///
    /// Takes diagnostics from the merge step and adds validation diagnostics.
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let mut errors = Vec::new();

        let logging = if let Some(partial_logging) = partial.logging {
            LoggingConfig {
                level: partial_logging
                    .level
                    .map(|s| *s.get_ref())
                    .unwrap_or_default(),
                overrides: partial_logging
                    .overrides
                    .map(|hm| hm.into_iter().map(|(k, v)| (k, *v.get_ref())).collect())
                    .unwrap_or_default(),
            }
        } else {
            LoggingConfig::default()
        };

        let api = Self::validate_api(
            partial.api.unwrap_or_default(),
            &partial.origins,
            &mut errors,
        );

        let integrations = Self::validate_integrations(
            partial.integrations.unwrap_or_default(),
            &partial.origins,
            &mut errors,
        );

        diagnostics.extend(
            errors
                .into_iter()
                .map(|e| Diagnostic::Error(Error::Validation(e))),
        );

        if diagnostics.iter().any(|d| d.is_error()) {
            return Err(ConfigError::Invalid(format_diagnostics(&diagnostics)));
        }

        Ok((
            Config {
                logging,
                api,
                integrations,
            },
            diagnostics,
        ))
    }

    fn validate_api(
        partial: PartialApiConfig,
        origins: &HashMap<String, super::diagnostics::SourceLocation>,
        errors: &mut Vec<ValidationError>,
    ) -> ApiConfig {
        let mut api = ApiConfig::default();

        if let Some(port) = partial.port {
            api.port = port.into_inner();
        }

        let listen = partial
            .listen
            .map(|s| s.into_inner())
            .unwrap_or_else(|| DEFAULT_API_LISTEN.to_string());
        match listen.parse::<IpAddr>() {
            Ok(addr) => api.listen = addr,
            Err(_) => errors.push(ValidationError {
                field_path: "api.listen".to_string(),
                message: format!("'{}' is not an IP address", listen),
                location: origins.get("api.listen").cloned(),
            }),
        }

        api
    }

    #[cfg_attr(not(feature = "integration_mealie"), allow(unused_variables))]
    fn validate_integrations(
        partial: PartialIntegrationsConfig,
        origins: &HashMap<String, super::diagnostics::SourceLocation>,
        errors: &mut Vec<ValidationError>,
    ) -> IntegrationsConfig {
        #[cfg(feature = "integration_mealie")]
        let mealie = match partial.mealie {
            Some(partial_mealie) => match MealieConfig::from_partial(partial_mealie, origins) {
                Ok(config) => Some(config),
                Err(mealie_errors) => {
                    errors.extend(mealie_errors);
                    None
                }
            },
            None => None,
        };

        IntegrationsConfig {
            #[cfg(feature = "integration_mealie")]
            mealie,
        }
    }
}
