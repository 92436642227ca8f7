use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Region used when `VISION_ONE_REGION` is unset
pub const DEFAULT_REGION: &str = "us-east-1";

/// Service regions the scan gateway can relay to
pub const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "eu-central-1",
    "ap-northeast-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-south-1",
    "me-central-1",
];

/// Scan gateway sidecar address used when `SCAN_GATEWAY_URL` is unset
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8080";

/// Total request body cap (16 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub const DEFAULT_UPLOAD_DIR: &str = "uploads/";

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:80";

/// Startup failures. Any of these stops the process before it serves traffic.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("VISION_ONE_API_KEY environment variable is not set")]
    MissingCredential,

    #[error("Unknown scan region '{0}'")]
    UnknownRegion(String),

    #[error("Unknown scanner backend '{0}' (expected 'http_gateway' or 'clamav')")]
    UnknownBackend(String),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidSetting { key: &'static str, value: String },

    #[error("Failed to build scan client: {0}")]
    Client(String),
}

/// Secret credential for the scanning backend. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerBackend {
    HttpGateway,
    ClamAv,
}

impl FromStr for ScannerBackend {
    type Err = InitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http_gateway" | "gateway" => Ok(Self::HttpGateway),
            "clamav" => Ok(Self::ClamAv),
            other => Err(InitError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for ScannerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpGateway => f.write_str("http_gateway"),
            Self::ClamAv => f.write_str("clamav"),
        }
    }
}

/// Settings for the scan session
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Which backend performs the scan (default: http_gateway)
    pub backend: ScannerBackend,

    /// Service region relayed by the gateway (default: "us-east-1")
    pub region: String,

    /// Credential, required for the http_gateway backend
    pub api_key: Option<ApiKey>,

    /// Scan gateway base URL (default: "http://127.0.0.1:8080")
    pub gateway_url: String,

    /// Enable predictive machine learning detection
    pub pml: bool,

    /// Tags attached to each scan request
    pub tags: Vec<String>,

    /// Whole-call timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// ClamAV host (default: "127.0.0.1")
    pub clamav_host: String,

    /// ClamAV port (default: 3310)
    pub clamav_port: u16,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            backend: ScannerBackend::HttpGateway,
            region: DEFAULT_REGION.to_string(),
            api_key: None,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            pml: false,
            tags: Vec::new(),
            timeout: None,
            clamav_host: "127.0.0.1".to_string(),
            clamav_port: 3310,
        }
    }
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Staging directory (default: "uploads/")
    pub upload_dir: PathBuf,

    /// Maximum request body in bytes; larger requests get 413
    pub max_upload_bytes: usize,

    pub listen_addr: SocketAddr,

    pub scan: ScanConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, InitError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, InitError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ScanConfig::default();

        let backend = match lookup("SCANNER_BACKEND") {
            Some(v) => v.parse()?,
            None => defaults.backend,
        };

        let api_key = lookup("VISION_ONE_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .map(ApiKey::new);
        if backend == ScannerBackend::HttpGateway && api_key.is_none() {
            return Err(InitError::MissingCredential);
        }

        let scan = ScanConfig {
            backend,
            region: lookup("VISION_ONE_REGION")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.region),
            api_key,
            gateway_url: lookup("SCAN_GATEWAY_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.gateway_url),
            pml: lookup("SCAN_PML")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.pml),
            tags: lookup("SCAN_TAGS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            timeout: parse_opt::<u64, _>(&lookup, "SCAN_TIMEOUT_SECS")?.map(Duration::from_secs),
            clamav_host: lookup("CLAMAV_HOST").unwrap_or(defaults.clamav_host),
            clamav_port: parse_opt(&lookup, "CLAMAV_PORT")?.unwrap_or(defaults.clamav_port),
        };

        Ok(Self {
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            max_upload_bytes: parse_opt(&lookup, "MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            listen_addr: match parse_opt(&lookup, "LISTEN_ADDR")? {
                Some(addr) => addr,
                None => DEFAULT_LISTEN_ADDR
                    .parse()
                    .map_err(|_| InitError::InvalidSetting {
                        key: "LISTEN_ADDR",
                        value: DEFAULT_LISTEN_ADDR.to_string(),
                    })?,
            },
            scan,
        })
    }
}

fn parse_opt<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, InitError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| InitError::InvalidSetting { key, value }),
    }
}
