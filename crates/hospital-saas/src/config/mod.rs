use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
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
    pub hospital: HospitalSettings,
    pub scheduler: SchedulerConfig,
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

        let defaults = HospitalSettings::default();
        let hospital = HospitalSettings {
            enable_sms_notifications: env_flag(
                "HOSPITAL_ENABLE_SMS",
                defaults.enable_sms_notifications,
            )?,
            enable_email_notifications: env_flag(
                "HOSPITAL_ENABLE_EMAIL",
                defaults.enable_email_notifications,
            )?,
            auto_create_invoice: env_flag("HOSPITAL_AUTO_INVOICE", defaults.auto_create_invoice)?,
            auto_create_radiology_invoice: env_flag(
                "HOSPITAL_AUTO_RADIOLOGY_INVOICE",
                defaults.auto_create_radiology_invoice,
            )?,
            default_total_beds: match env::var("HOSPITAL_DEFAULT_BEDS") {
                Ok(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| ConfigError::InvalidNumber {
                        key: "HOSPITAL_DEFAULT_BEDS",
                    })?,
                Err(_) => defaults.default_total_beds,
            },
        };

        let tick_secs = match env::var("HOSPITAL_SCHEDULER_TICK_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: "HOSPITAL_SCHEDULER_TICK_SECS",
                })?,
            Err(_) => 3600,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            hospital,
            scheduler: SchedulerConfig {
                tick: Duration::from_secs(tick_secs.max(1)),
            },
        })
    }
}

fn env_flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key }),
        },
        Err(_) => Ok(default),
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Deployment-wide switches shared by every tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HospitalSettings {
    pub enable_sms_notifications: bool,
    pub enable_email_notifications: bool,
    /// Raise a draft invoice when an appointment is confirmed.
    pub auto_create_invoice: bool,
    /// Raise a draft invoice when a radiology order is submitted.
    pub auto_create_radiology_invoice: bool,
    /// Bed count assumed when a hospital has not recorded one.
    pub default_total_beds: u32,
}

impl Default for HospitalSettings {
    fn default() -> Self {
        Self {
            enable_sms_notifications: true,
            enable_email_notifications: true,
            auto_create_invoice: false,
            auto_create_radiology_invoice: false,
            default_total_beds: 100,
        }
    }
}

/// Cadence of the background task loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick: Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidFlag { key: &'static str },
    InvalidNumber { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidFlag { key } => {
                write!(f, "{key} must be one of true/false/1/0/yes/no/on/off")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidFlag { .. }
            | ConfigError::InvalidNumber { .. } => None,
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
            "HOSPITAL_ENABLE_SMS",
            "HOSPITAL_ENABLE_EMAIL",
            "HOSPITAL_AUTO_INVOICE",
            "HOSPITAL_AUTO_RADIOLOGY_INVOICE",
            "HOSPITAL_DEFAULT_BEDS",
            "HOSPITAL_SCHEDULER_TICK_SECS",
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
        assert_eq!(config.hospital, HospitalSettings::default());
        assert_eq!(config.scheduler.tick, Duration::from_secs(3600));
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
    fn reads_hospital_switches() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HOSPITAL_ENABLE_SMS", "off");
        env::set_var("HOSPITAL_AUTO_RADIOLOGY_INVOICE", "yes");
        env::set_var("HOSPITAL_DEFAULT_BEDS", "40");
        let config = AppConfig::load().expect("config loads");
        assert!(!config.hospital.enable_sms_notifications);
        assert!(config.hospital.auto_create_radiology_invoice);
        assert_eq!(config.hospital.default_total_beds, 40);
        reset_env();
    }

    #[test]
    fn rejects_garbled_flag() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HOSPITAL_ENABLE_EMAIL", "maybe");
        match AppConfig::load() {
            Err(ConfigError::InvalidFlag { key }) => assert_eq!(key, "HOSPITAL_ENABLE_EMAIL"),
            other => panic!("expected invalid flag, got {other:?}"),
        }
        reset_env();
    }
}
