use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::error::{PollError, Result};

const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "https://polling-frontend-sepia.vercel.app",
];

pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub poll: PollConfig,
    pub log: LogConfig,
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

pub struct PollConfig {
    pub default_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub struct LogConfig {
    pub format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let port = env::var("SERVER_PORT")
            .or_else(|_| env::var("PORT"))
            .unwrap_or_else(|_| "4000".to_string());

        let origins = env::var("ALLOWED_ORIGINS").ok();

        let config = Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_port(&port)?,
            },
            cors: CorsConfig {
                allowed_origins: parse_origins(origins.as_deref()),
            },
            poll: PollConfig {
                default_timeout_secs: env::var("POLL_DEFAULT_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .trim()
                    .parse()
                    .map_err(|_| {
                        PollError::ConfigurationParseFailed(
                            "POLL_DEFAULT_TIMEOUT_SECS must be a whole number of seconds".to_string(),
                        )
                    })?,
            },
            log: LogConfig {
                format: parse_log_format(env::var("LOG_FORMAT").ok().as_deref())?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll.default_timeout_secs == 0 {
            return Err(PollError::invalid_configuration(
                "POLL_DEFAULT_TIMEOUT_SECS must be greater than zero",
            ));
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(PollError::invalid_configuration(
                "ALLOWED_ORIGINS must list at least one origin",
            ));
        }

        for origin in &self.cors.allowed_origins {
            let has_scheme = origin.starts_with("http://") || origin.starts_with("https://");
            if !has_scheme || origin.ends_with('/') {
                return Err(PollError::invalid_configuration(format!(
                    "origin {:?} must look like scheme://host[:port]",
                    origin
                )));
            }
        }

        Ok(())
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        match self.server.host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ipv4)) => return ipv4,
            Ok(IpAddr::V6(_)) => {
                tracing::warn!(
                    host = %self.server.host,
                    "IPv6 host is not supported, binding 0.0.0.0"
                );
                return Ipv4Addr::UNSPECIFIED;
            }
            Err(_) => {}
        }

        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::LOCALHOST,
            "" => Ipv4Addr::UNSPECIFIED,
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, binding 0.0.0.0"
                );
                Ipv4Addr::UNSPECIFIED
            }
        }
    }
}

impl PollConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse()
        .map_err(|_| PollError::ConfigurationParseFailed(format!("invalid port {:?}", raw)))
}

fn parse_origins(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(list) if !list.trim().is_empty() => list
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect(),
        _ => DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
    }
}

fn parse_log_format(raw: Option<&str>) -> Result<LogFormat> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("pretty") => Ok(LogFormat::Pretty),
        Some("json") => Ok(LogFormat::Json),
        Some(other) => Err(PollError::ConfigurationParseFailed(format!(
            "unknown LOG_FORMAT {:?}, expected pretty or json",
            other
        ))),
    }
}
