use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub dispatch: DispatchConfig,
    pub engine: EngineConfig,
    pub features: FeatureConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let include_targets = environment != AppEnvironment::Production;

        let defaults = DispatchConfig::default();
        let dispatch = DispatchConfig {
            observer_timeout: Duration::from_millis(parse_var(
                "APP_OBSERVER_TIMEOUT_MS",
                defaults.observer_timeout.as_millis() as u64,
            )?),
            channel_max_attempts: parse_var(
                "APP_CHANNEL_MAX_ATTEMPTS",
                defaults.channel_max_attempts,
            )?,
            channel_backoff: Duration::from_millis(parse_var(
                "APP_CHANNEL_BACKOFF_MS",
                defaults.channel_backoff.as_millis() as u64,
            )?),
            channel_queue_depth: parse_var(
                "APP_CHANNEL_QUEUE_DEPTH",
                defaults.channel_queue_depth,
            )?,
        };
        if dispatch.channel_max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                key: "APP_CHANNEL_MAX_ATTEMPTS",
                detail: "at least one delivery attempt is required",
            });
        }
        if dispatch.channel_queue_depth == 0 {
            return Err(ConfigError::OutOfRange {
                key: "APP_CHANNEL_QUEUE_DEPTH",
                detail: "queue depth must be positive",
            });
        }

        let engine = EngineConfig {
            conflict_retries: parse_var(
                "APP_CONFLICT_RETRIES",
                EngineConfig::default().conflict_retries,
            )?,
        };

        let features = FeatureConfig {
            emergency_mode: parse_flag("APP_EMERGENCY_MODE")?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                include_targets,
            },
            dispatch,
            engine,
            features,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(key: &'static str) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key, value: raw }),
        },
        Err(_) => Ok(false),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub include_targets: bool,
}

/// Fan-out limits for observers and external channel delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub observer_timeout: Duration,
    pub channel_max_attempts: u32,
    pub channel_backoff: Duration,
    pub channel_queue_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            observer_timeout: Duration::from_secs(2),
            channel_max_attempts: 3,
            channel_backoff: Duration::from_millis(200),
            channel_queue_depth: 256,
        }
    }
}

/// Transition engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Extra optimistic attempts after the first compare-and-swap loses a race.
    pub conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 5,
        }
    }
}

/// Startup values for runtime feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureConfig {
    pub emergency_mode: bool,
}

/// Read-only view of runtime feature flags consulted by the ranking engine.
pub trait FeatureFlagProvider: Send + Sync {
    fn emergency_mode(&self) -> bool;
}

/// Flags fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticFeatureFlags {
    pub emergency_mode: bool,
}

impl FeatureFlagProvider for StaticFeatureFlags {
    fn emergency_mode(&self) -> bool {
        self.emergency_mode
    }
}

impl From<FeatureConfig> for StaticFeatureFlags {
    fn from(value: FeatureConfig) -> Self {
        Self {
            emergency_mode: value.emergency_mode,
        }
    }
}

/// Flags an operator console can flip while the process runs.
#[derive(Debug, Default)]
pub struct ToggleFeatureFlags {
    emergency_mode: AtomicBool,
}

impl ToggleFeatureFlags {
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            emergency_mode: AtomicBool::new(config.emergency_mode),
        }
    }

    pub fn set_emergency_mode(&self, enabled: bool) {
        self.emergency_mode.store(enabled, Ordering::Release);
    }

    /// Flip emergency mode and return the new value.
    pub fn toggle_emergency_mode(&self) -> bool {
        !self.emergency_mode.fetch_xor(true, Ordering::AcqRel)
    }
}

impl FeatureFlagProvider for ToggleFeatureFlags {
    fn emergency_mode(&self) -> bool {
        self.emergency_mode.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidNumber {
        key: &'static str,
        value: String,
    },
    InvalidFlag {
        key: &'static str,
        value: String,
    },
    OutOfRange {
        key: &'static str,
        detail: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer (got '{value}')")
            }
            ConfigError::InvalidFlag { key, value } => {
                write!(f, "{key} must be true/false (got '{value}')")
            }
            ConfigError::OutOfRange { key, detail } => write!(f, "{key}: {detail}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_OBSERVER_TIMEOUT_MS",
            "APP_CHANNEL_MAX_ATTEMPTS",
            "APP_CHANNEL_BACKOFF_MS",
            "APP_CHANNEL_QUEUE_DEPTH",
            "APP_CONFLICT_RETRIES",
            "APP_EMERGENCY_MODE",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.dispatch, DispatchConfig::default());
        assert_eq!(config.engine.conflict_retries, 5);
        assert!(!config.features.emergency_mode);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_dispatch_and_feature_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_OBSERVER_TIMEOUT_MS", "750");
        env::set_var("APP_CHANNEL_MAX_ATTEMPTS", "5");
        env::set_var("APP_EMERGENCY_MODE", "on");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.dispatch.observer_timeout, Duration::from_millis(750));
        assert_eq!(config.dispatch.channel_max_attempts, 5);
        assert!(config.features.emergency_mode);
        reset_env();
    }

    #[test]
    fn rejects_zero_delivery_attempts() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_CHANNEL_MAX_ATTEMPTS", "0");
        match AppConfig::load() {
            Err(ConfigError::OutOfRange { key, .. }) => {
                assert_eq!(key, "APP_CHANNEL_MAX_ATTEMPTS")
            }
            other => panic!("expected range error, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn rejects_garbage_flag() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_EMERGENCY_MODE", "maybe");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidFlag { .. })
        ));
        reset_env();
    }

    #[test]
    fn toggle_flags_flip_emergency_mode() {
        let flags = ToggleFeatureFlags::new(FeatureConfig::default());
        assert!(!flags.emergency_mode());
        assert!(flags.toggle_emergency_mode());
        assert!(flags.emergency_mode());
        flags.set_emergency_mode(false);
        assert!(!flags.emergency_mode());
    }
}
