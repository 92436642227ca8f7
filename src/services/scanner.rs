use crate::config::{InitError, KNOWN_REGIONS, ScanConfig, ScannerBackend};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Scan backend answer before interpretation.
///
/// Backends hand back either an already-decoded report or the JSON text of
/// one; [`crate::services::orchestrator::parse_verdict`] accepts both.
#[derive(Debug, Clone)]
pub enum RawScanResult {
    Structured(serde_json::Value),
    Text(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Scan backend unreachable: {0}")]
    Network(String),

    #[error("Scan backend rejected the credential (HTTP {0})")]
    Unauthorized(u16),

    #[error("Scan backend rejected the request: {0}")]
    Rejected(String),

    #[error("Malformed scan result: {0}")]
    MalformedResponse(String),

    #[error("Failed to read staged file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scan timed out after {0:?}")]
    Timeout(Duration),
}

/// A long-lived, authenticated session to a scanning backend. Shared
/// read-only by every request.
#[async_trait::async_trait]
pub trait ScanClient: Send + Sync {
    /// Scan the file at `path`. Blocks the caller until the backend answers.
    async fn scan(&self, path: &Path) -> Result<RawScanResult, ScanError>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    fn backend_name(&self) -> &'static str;
}

/// Client for an HTTP scan gateway.
///
/// The gateway is a sidecar that holds the vendor scanning SDK. It takes the
/// raw file bytes, relays them to the configured service region under the
/// caller's credential, and answers with the vendor's JSON scan report.
pub struct HttpGatewayScanner {
    client: reqwest::Client,
    gateway_url: String,
    region: String,
    pml: bool,
    tags: Vec<String>,
    timeout: Option<Duration>,
}

impl HttpGatewayScanner {
    /// Builds the session once at startup. The credential is baked into the
    /// client's default headers and never logged.
    pub fn initialize(config: &ScanConfig) -> Result<Self, InitError> {
        let api_key = config.api_key.as_ref().ok_or(InitError::MissingCredential)?;

        if !KNOWN_REGIONS.contains(&config.region.as_str()) {
            return Err(InitError::UnknownRegion(config.region.clone()));
        }

        let gateway_url = config.gateway_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&gateway_url).map_err(|_| InitError::InvalidSetting {
            key: "SCAN_GATEWAY_URL",
            value: config.gateway_url.clone(),
        })?;

        let mut auth = HeaderValue::from_str(&format!("ApiKey {}", api_key.expose()))
            .map_err(|_| InitError::InvalidSetting {
                key: "VISION_ONE_API_KEY",
                value: "<redacted>".to_string(),
            })?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| InitError::Client(e.to_string()))?;

        Ok(Self {
            client,
            gateway_url,
            region: config.region.clone(),
            pml: config.pml,
            tags: config.tags.clone(),
            timeout: config.timeout,
        })
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> ScanError {
        match self.timeout {
            Some(timeout) if e.is_timeout() => ScanError::Timeout(timeout),
            _ => ScanError::Network(e.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl ScanClient for HttpGatewayScanner {
    async fn scan(&self, path: &Path) -> Result<RawScanResult, ScanError> {
        let data = tokio::fs::read(path).await.map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut query = vec![
            ("region", self.region.clone()),
            ("pml", self.pml.to_string()),
        ];
        if !self.tags.is_empty() {
            query.push(("tags", self.tags.join(",")));
        }

        let response = self
            .client
            .post(format!("{}/api/v1/scan", self.gateway_url))
            .query(&query)
            .header("X-File-Name", file_name)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ScanError::Unauthorized(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        if !status.is_success() {
            return Err(ScanError::Rejected(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        tracing::debug!("Scan gateway response: {}", body);
        Ok(RawScanResult::Text(body))
    }

    async fn health_check(&self) -> bool {
        // Any HTTP answer means the gateway is reachable
        self.client.get(&self.gateway_url).send().await.is_ok()
    }

    fn backend_name(&self) -> &'static str {
        "http_gateway"
    }
}

/// ClamAV scanner using TCP socket (clamd)
///
/// Docker command to run ClamAV:
/// ```bash
/// docker run -d --name clamav -p 3310:3310 clamav/clamav:latest
/// ```
pub struct ClamAvScanner {
    host: String,
    port: u16,
    timeout: Option<Duration>,
}

impl ClamAvScanner {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connect(&self) -> Result<TcpStream, ScanError> {
        let addr = format!("{}:{}", self.host, self.port);
        TcpStream::connect(&addr)
            .await
            .map_err(|e| ScanError::Network(format!("Failed to connect to ClamAV at {}: {}", addr, e)))
    }

    async fn instream(&self, path: &Path) -> Result<String, ScanError> {
        let io_err = |source: std::io::Error| ScanError::Io {
            path: path.to_path_buf(),
            source,
        };
        let net_err = |e: std::io::Error| ScanError::Network(e.to_string());

        let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
        let mut stream = self.connect().await?;

        // Format: zINSTREAM\0 <length:u32 big-endian> <data> ... <0:u32>
        stream.write_all(b"zINSTREAM\0").await.map_err(net_err)?;

        const CHUNK_SIZE: usize = 1024 * 1024;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buffer).await.map_err(io_err)?;
            if n == 0 {
                break;
            }
            let len = (n as u32).to_be_bytes();
            stream.write_all(&len).await.map_err(net_err)?;
            stream.write_all(&buffer[..n]).await.map_err(net_err)?;
        }

        // Zero-length chunk ends the stream
        stream.write_all(&0u32.to_be_bytes()).await.map_err(net_err)?;
        stream.flush().await.map_err(net_err)?;

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.map_err(net_err)?;

        let response = String::from_utf8_lossy(&response);
        Ok(response.trim_end_matches('\0').trim().to_string())
    }
}

/// Translates a clamd reply into the report shape the scan gateway returns
pub fn clamd_reply_to_report(reply: &str) -> Result<RawScanResult, ScanError> {
    if reply.ends_with("OK") {
        Ok(RawScanResult::Structured(json!({ "foundMalwares": [] })))
    } else if reply.ends_with("FOUND") {
        let threat = reply
            .split_once(':')
            .map(|(_, rest)| rest)
            .unwrap_or(reply)
            .trim()
            .trim_end_matches("FOUND")
            .trim();
        Ok(RawScanResult::Structured(json!({
            "foundMalwares": [{ "malwareName": threat }]
        })))
    } else if reply.ends_with("ERROR") {
        Err(ScanError::Rejected(reply.to_string()))
    } else {
        Err(ScanError::MalformedResponse(format!(
            "Unexpected ClamAV response: {}",
            reply
        )))
    }
}

#[async_trait::async_trait]
impl ScanClient for ClamAvScanner {
    async fn scan(&self, path: &Path) -> Result<RawScanResult, ScanError> {
        let reply = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.instream(path))
                .await
                .map_err(|_| ScanError::Timeout(timeout))??,
            None => self.instream(path).await?,
        };

        tracing::debug!("ClamAV response: {}", reply);
        clamd_reply_to_report(&reply)
    }

    async fn health_check(&self) -> bool {
        match self.connect().await {
            Ok(mut stream) => {
                if stream.write_all(b"zPING\0").await.is_err() {
                    return false;
                }
                if stream.flush().await.is_err() {
                    return false;
                }

                let mut response = [0u8; 16];
                match stream.read(&mut response).await {
                    Ok(n) => {
                        let resp = String::from_utf8_lossy(&response[..n]);
                        resp.contains("PONG")
                    }
                    Err(_) => false,
                }
            }
            Err(_) => false,
        }
    }

    fn backend_name(&self) -> &'static str {
        "clamav"
    }
}

/// Factory function to create the configured scan session
pub fn create_scanner(config: &ScanConfig) -> Result<Arc<dyn ScanClient>, InitError> {
    match config.backend {
        ScannerBackend::HttpGateway => Ok(Arc::new(HttpGatewayScanner::initialize(config)?)),
        ScannerBackend::ClamAv => Ok(Arc::new(
            ClamAvScanner::new(config.clamav_host.clone(), config.clamav_port)
                .with_timeout(config.timeout),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKey;

    fn gateway_config() -> ScanConfig {
        ScanConfig {
            api_key: Some(ApiKey::new("test-key")),
            ..ScanConfig::default()
        }
    }

    #[test]
    fn test_initialize_requires_credential() {
        let config = ScanConfig::default();
        assert!(matches!(
            HttpGatewayScanner::initialize(&config),
            Err(InitError::MissingCredential)
        ));
    }

    #[test]
    fn test_initialize_rejects_unknown_region() {
        let config = ScanConfig {
            region: "nowhere-1".to_string(),
            ..gateway_config()
        };
        assert!(matches!(
            HttpGatewayScanner::initialize(&config),
            Err(InitError::UnknownRegion(_))
        ));

        for region in KNOWN_REGIONS {
            let config = ScanConfig {
                region: region.to_string(),
                ..gateway_config()
            };
            assert!(HttpGatewayScanner::initialize(&config).is_ok(), "{}", region);
        }
    }

    #[test]
    fn test_initialize_rejects_bad_gateway_url() {
        let config = ScanConfig {
            gateway_url: "not a url".to_string(),
            ..gateway_config()
        };
        assert!(matches!(
            HttpGatewayScanner::initialize(&config),
            Err(InitError::InvalidSetting {
                key: "SCAN_GATEWAY_URL",
                ..
            })
        ));
    }

    #[test]
    fn test_gateway_url_trailing_slash_is_trimmed() {
        let config = ScanConfig {
            gateway_url: "http://127.0.0.1:9999/".to_string(),
            ..gateway_config()
        };
        let scanner = HttpGatewayScanner::initialize(&config).unwrap();
        assert_eq!(scanner.gateway_url(), "http://127.0.0.1:9999");
    }

    #[test]
    fn test_clamd_reply_parsing() {
        let clean = clamd_reply_to_report("stream: OK").unwrap();
        assert!(matches!(
            clean,
            RawScanResult::Structured(ref v) if v["foundMalwares"].as_array().unwrap().is_empty()
        ));

        let infected = clamd_reply_to_report("stream: Eicar-Test-Signature FOUND").unwrap();
        match infected {
            RawScanResult::Structured(v) => {
                assert_eq!(v["foundMalwares"][0]["malwareName"], "Eicar-Test-Signature");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            clamd_reply_to_report("INSTREAM size limit exceeded. ERROR"),
            Err(ScanError::Rejected(_))
        ));
        assert!(matches!(
            clamd_reply_to_report("garbage"),
            Err(ScanError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_clamav_unreachable_is_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"content").unwrap();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let scanner = ClamAvScanner::new("127.0.0.1".to_string(), port);
        assert!(matches!(
            scanner.scan(&path).await,
            Err(ScanError::Network(_))
        ));
        assert!(!scanner.health_check().await);
    }

    #[tokio::test]
    async fn test_clamav_silent_daemon_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"content").unwrap();

        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let timeout = Duration::from_millis(300);
        let scanner = ClamAvScanner::new("127.0.0.1".to_string(), port).with_timeout(Some(timeout));
        assert!(matches!(
            scanner.scan(&path).await,
            Err(ScanError::Timeout(t)) if t == timeout
        ));

        server.abort();
    }

    #[test]
    fn test_create_scanner() {
        let scanner = create_scanner(&gateway_config()).unwrap();
        assert_eq!(scanner.backend_name(), "http_gateway");

        let config = ScanConfig {
            backend: ScannerBackend::ClamAv,
            ..ScanConfig::default()
        };
        let scanner = create_scanner(&config).unwrap();
        assert_eq!(scanner.backend_name(), "clamav");
    }
}
