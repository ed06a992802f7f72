use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::{DEFAULT_PAGE_SIZE, DEFAULT_TOP_MARKETS};

pub const MAX_PAGE_SIZE: usize = 10_000;
pub const DEFAULT_REGION_CENTER_LAT: f64 = -22.9838;
pub const DEFAULT_REGION_CENTER_LNG: f64 = -43.2244;

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub pricing: PricingConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PricingConfig {
    pub page_size: usize,
    pub top_markets_limit: usize,
    /// `None` keeps every observation regardless of age.
    pub max_observation_age_days: Option<u32>,
    pub unlocated_policy: UnlocatedPolicyKind,
    pub region_center_lat: f64,
    pub region_center_lng: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportConfig {
    pub recent_observation_window: usize,
    pub search_event_window: usize,
    pub top_search_terms: usize,
    pub most_expensive_limit: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlocatedPolicyKind {
    ExcludeUnlocated,
    FallbackToRegionCenter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://temtudo.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            pricing: PricingConfig {
                page_size: DEFAULT_PAGE_SIZE,
                top_markets_limit: DEFAULT_TOP_MARKETS,
                max_observation_age_days: None,
                unlocated_policy: UnlocatedPolicyKind::ExcludeUnlocated,
                region_center_lat: DEFAULT_REGION_CENTER_LAT,
                region_center_lng: DEFAULT_REGION_CENTER_LNG,
            },
            report: ReportConfig {
                recent_observation_window: 100,
                search_event_window: 50,
                top_search_terms: 10,
                most_expensive_limit: 5,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for UnlocatedPolicyKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exclude_unlocated" => Ok(Self::ExcludeUnlocated),
            "fallback_to_region_center" => Ok(Self::FallbackToRegionCenter),
            other => Err(ConfigError::Validation(format!(
                "unsupported unlocated policy `{other}` (expected exclude_unlocated|fallback_to_region_center)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("temtudo.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(page_size) = pricing.page_size {
                self.pricing.page_size = page_size;
            }
            if let Some(top_markets_limit) = pricing.top_markets_limit {
                self.pricing.top_markets_limit = top_markets_limit;
            }
            if let Some(days) = pricing.max_observation_age_days {
                self.pricing.max_observation_age_days = Some(days);
            }
            if let Some(policy) = pricing.unlocated_policy {
                self.pricing.unlocated_policy = policy;
            }
            if let Some(lat) = pricing.region_center_lat {
                self.pricing.region_center_lat = lat;
            }
            if let Some(lng) = pricing.region_center_lng {
                self.pricing.region_center_lng = lng;
            }
        }

        if let Some(report) = patch.report {
            if let Some(window) = report.recent_observation_window {
                self.report.recent_observation_window = window;
            }
            if let Some(window) = report.search_event_window {
                self.report.search_event_window = window;
            }
            if let Some(limit) = report.top_search_terms {
                self.report.top_search_terms = limit;
            }
            if let Some(limit) = report.most_expensive_limit {
                self.report.most_expensive_limit = limit;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TEMTUDO_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TEMTUDO_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("TEMTUDO_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TEMTUDO_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("TEMTUDO_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TEMTUDO_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TEMTUDO_SERVER_PORT") {
            self.server.port = parse_env("TEMTUDO_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TEMTUDO_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("TEMTUDO_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TEMTUDO_PRICING_PAGE_SIZE") {
            self.pricing.page_size = parse_env("TEMTUDO_PRICING_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("TEMTUDO_PRICING_TOP_MARKETS_LIMIT") {
            self.pricing.top_markets_limit = parse_env("TEMTUDO_PRICING_TOP_MARKETS_LIMIT", &value)?;
        }
        if let Some(value) = read_env("TEMTUDO_PRICING_MAX_OBSERVATION_AGE_DAYS") {
            self.pricing.max_observation_age_days =
                Some(parse_env("TEMTUDO_PRICING_MAX_OBSERVATION_AGE_DAYS", &value)?);
        }
        if let Some(value) = read_env("TEMTUDO_PRICING_UNLOCATED_POLICY") {
            self.pricing.unlocated_policy = value.parse()?;
        }
        if let Some(value) = read_env("TEMTUDO_PRICING_REGION_CENTER_LAT") {
            self.pricing.region_center_lat = parse_env("TEMTUDO_PRICING_REGION_CENTER_LAT", &value)?;
        }
        if let Some(value) = read_env("TEMTUDO_PRICING_REGION_CENTER_LNG") {
            self.pricing.region_center_lng = parse_env("TEMTUDO_PRICING_REGION_CENTER_LNG", &value)?;
        }

        if let Some(value) = read_env("TEMTUDO_REPORT_RECENT_OBSERVATION_WINDOW") {
            self.report.recent_observation_window =
                parse_env("TEMTUDO_REPORT_RECENT_OBSERVATION_WINDOW", &value)?;
        }
        if let Some(value) = read_env("TEMTUDO_REPORT_SEARCH_EVENT_WINDOW") {
            self.report.search_event_window =
                parse_env("TEMTUDO_REPORT_SEARCH_EVENT_WINDOW", &value)?;
        }

        let log_level = read_env("TEMTUDO_LOGGING_LEVEL").or_else(|| read_env("TEMTUDO_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TEMTUDO_LOGGING_FORMAT").or_else(|| read_env("TEMTUDO_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_pricing(&self.pricing)?;
        validate_report(&self.report)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("temtudo.toml"), PathBuf::from("config/temtudo.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${VAR}` with the value of `VAR`.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let key = &after[..end];

        let value = env::var(key)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if pricing.page_size == 0 || pricing.page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::Validation(format!(
            "pricing.page_size must be in range 1..={MAX_PAGE_SIZE}"
        )));
    }

    if pricing.top_markets_limit == 0 {
        return Err(ConfigError::Validation(
            "pricing.top_markets_limit must be greater than zero".to_string(),
        ));
    }

    if pricing.max_observation_age_days == Some(0) {
        return Err(ConfigError::Validation(
            "pricing.max_observation_age_days must be greater than zero when set".to_string(),
        ));
    }

    let lat_ok = pricing.region_center_lat.is_finite()
        && (-90.0..=90.0).contains(&pricing.region_center_lat);
    let lng_ok = pricing.region_center_lng.is_finite()
        && (-180.0..=180.0).contains(&pricing.region_center_lng);
    if !lat_ok || !lng_ok {
        return Err(ConfigError::Validation(
            "pricing.region_center_lat/lng must be a valid coordinate pair".to_string(),
        ));
    }

    Ok(())
}

fn validate_report(report: &ReportConfig) -> Result<(), ConfigError> {
    let windows = [
        ("report.recent_observation_window", report.recent_observation_window),
        ("report.search_event_window", report.search_event_window),
        ("report.top_search_terms", report.top_search_terms),
        ("report.most_expensive_limit", report.most_expensive_limit),
    ];
    for (key, value) in windows {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{key} must be greater than zero")));
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    pricing: Option<PricingPatch>,
    report: Option<ReportPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    page_size: Option<usize>,
    top_markets_limit: Option<usize>,
    max_observation_age_days: Option<u32>,
    unlocated_policy: Option<UnlocatedPolicyKind>,
    region_center_lat: Option<f64>,
    region_center_lng: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportPatch {
    recent_observation_window: Option<usize>,
    search_event_window: Option<usize>,
    top_search_terms: Option<usize>,
    most_expensive_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
