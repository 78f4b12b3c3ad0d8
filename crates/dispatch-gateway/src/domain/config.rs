//! Gateway configuration with validation and environment overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::{info, warn};

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Line-stream server configuration
    pub stream: StreamConfig,
    /// Document-codec gRPC server configuration
    pub rpc: RpcConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Outbound client configuration
    pub client: ClientConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stream_port = self.stream_port()?;
        let rpc_port = self.rpc_port()?;

        // Port 0 asks the OS for an ephemeral port, so it never collides.
        let mut ports = vec![self.http.port];
        if self.stream.enabled {
            ports.push(stream_port);
        }
        if self.rpc.enabled {
            ports.push(rpc_port);
        }
        let fixed: Vec<_> = ports.into_iter().filter(|p| *p != 0).collect();
        let unique: HashSet<_> = fixed.iter().collect();
        if unique.len() != fixed.len() {
            return Err(ConfigError::DuplicatePorts);
        }

        if self.http.max_body_size == 0 {
            return Err(ConfigError::InvalidLimit("max_body_size cannot be 0".into()));
        }
        if self.stream.max_line_length == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_line_length cannot be 0".into(),
            ));
        }
        if self.rpc.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_message_size cannot be 0".into(),
            ));
        }
        if self.client.pool_size == 0 {
            return Err(ConfigError::InvalidLimit("pool_size cannot be 0".into()));
        }
        if self.client.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "client max_message_size cannot be 0".into(),
            ));
        }

        for (name, timeout) in [
            ("request_timeout", self.client.request_timeout),
            ("dial_timeout", self.client.dial_timeout),
            ("read_write_timeout", self.client.read_write_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidTimeout(format!("{name} cannot be 0")));
            }
        }

        Ok(())
    }

    /// Stream port: explicit, else HTTP port + 1 (ephemeral when HTTP is).
    pub fn stream_port(&self) -> Result<u16, ConfigError> {
        match self.stream.port {
            Some(port) => Ok(port),
            None if self.http.port == 0 => Ok(0),
            None => self.http.port.checked_add(1).ok_or(ConfigError::PortOverflow),
        }
    }

    /// RPC port: explicit, else HTTP port + 2 (ephemeral when HTTP is).
    pub fn rpc_port(&self) -> Result<u16, ConfigError> {
        match self.rpc.port {
            Some(port) => Ok(port),
            None if self.http.port == 0 => Ok(0),
            None => self.http.port.checked_add(2).ok_or(ConfigError::PortOverflow),
        }
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Get line-stream server bind address
    pub fn stream_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.http.host, self.stream_port()?))
    }

    /// Get gRPC server bind address
    pub fn rpc_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.http.host, self.rpc_port()?))
    }

    /// Defaults overridden by `DISPATCH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("DISPATCH_HOST") {
            match host.parse() {
                Ok(h) => config.http.host = h,
                Err(_) => warn!(value = %host, "DISPATCH_HOST is not an IP address, ignored"),
            }
        }
        if let Some(port) = parse_var(&lookup, "DISPATCH_PORT") {
            config.http.port = port;
        }
        if let Some(port) = parse_var(&lookup, "DISPATCH_STREAM_PORT") {
            config.stream.port = Some(port);
        }
        if let Some(port) = parse_var(&lookup, "DISPATCH_RPC_PORT") {
            config.rpc.port = Some(port);
        }
        if let Some(enabled) = parse_var(&lookup, "DISPATCH_STREAM_ENABLED") {
            config.stream.enabled = enabled;
        }
        if let Some(enabled) = parse_var(&lookup, "DISPATCH_RPC_ENABLED") {
            config.rpc.enabled = enabled;
        }
        if let Some(origins) = lookup("DISPATCH_CORS_ORIGINS") {
            config.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
            info!(origins = ?config.cors.allowed_origins, "Loaded CORS origins from environment");
        }
        if let Some(same_origin) = parse_var(&lookup, "DISPATCH_SAME_ORIGIN") {
            config.cors.same_origin = same_origin;
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = key, value = %raw, "unparseable environment override ignored");
            None
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 9000)
    pub port: u16,
    /// Max request body size in bytes, multipart included (default: 32MB)
    pub max_body_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 9000,
            max_body_size: 32 << 20,
        }
    }
}

/// Line-stream server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Enable line-stream server
    pub enabled: bool,
    /// Port (default: HTTP port + 1)
    pub port: Option<u16>,
    /// Longest accepted line in bytes (default: 10MB)
    pub max_line_length: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
            max_line_length: 10 << 20,
        }
    }
}

/// gRPC server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Enable gRPC server
    pub enabled: bool,
    /// Port (default: HTTP port + 2)
    pub port: Option<u16>,
    /// Max encoded or decoded message size in bytes (default: 10MB)
    pub max_message_size: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
            max_message_size: 10 << 20,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Expose headers
    pub expose_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: u64,
    /// Allow credentials
    pub allow_credentials: bool,
    /// Reject requests whose Origin host differs from Host
    pub same_origin: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Authorization".to_string(),
                "X-Verify-Code".to_string(),
            ],
            expose_headers: vec!["x-request-id".to_string()],
            max_age: 86400, // 24 hours
            allow_credentials: false,
            same_origin: false,
        }
    }
}

/// Outbound client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Whole-request timeout of the HTTP client
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Connect timeout of the stream and gRPC clients
    #[serde(with = "humantime_serde")]
    pub dial_timeout: Duration,
    /// Per-call deadline of the stream client
    #[serde(with = "humantime_serde")]
    pub read_write_timeout: Duration,
    /// Max connections per pool
    pub pool_size: usize,
    /// Largest reply line (stream) or message (gRPC) a client accepts
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            dial_timeout: Duration::from_secs(5),
            read_write_timeout: Duration::from_secs(15),
            pool_size: 4,
            max_message_size: 10 * 1024 * 1024,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Multiple servers using the same port
    #[error("duplicate ports configured")]
    DuplicatePorts,
    /// Derived port does not fit in u16
    #[error("derived port exceeds 65535")]
    PortOverflow,
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
