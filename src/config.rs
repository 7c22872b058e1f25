//! Configuration management for vllm-gate
//!
//! Configuration is loaded from environment variables. The bearer secret may
//! also come from a `KEY=value` style secret file when the environment does
//! not carry it.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

/// Environment variable (and secret file key) holding the bearer secret
pub const SECRET_VAR: &str = "VLLM_PROXY_SECRET";

/// Upstream used when `VLLM_UPSTREAM_URL` is not set
pub const DEFAULT_UPSTREAM_URL: &str = "http://localhost:8000";

/// Shared bearer secret
///
/// Holds the raw bytes together with their SHA-256 digest so credential checks
/// compare fixed-size digests. Never empty.
#[derive(Clone)]
pub struct Secret {
    bytes: Vec<u8>,
    digest: [u8; 32],
}

impl Secret {
    /// Create a secret, rejecting empty values
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            bail!("{} must not be empty", SECRET_VAR);
        }
        let digest = Sha256::digest(&bytes).into();
        Ok(Self { bytes, digest })
    }

    /// SHA-256 digest of the secret
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([redacted; {} bytes])", self.bytes.len())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Bearer secret every proxied request must present
    pub secret: Secret,

    /// Base URL of the upstream inference server
    pub upstream_url: String,
    /// Connect timeout for upstream connections (in seconds)
    pub connect_timeout_seconds: u64,
    /// Idle pooled connections kept per upstream host
    pub pool_max_idle_per_host: usize,

    /// How long shutdown waits for in-flight relays (in seconds)
    pub shutdown_grace_seconds: u64,

    /// Address for the Prometheus exporter, disabled when unset
    pub metrics_addr: Option<SocketAddr>,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let secret = load_secret(&lookup)?;

        let upstream_url = var("VLLM_UPSTREAM_URL", DEFAULT_UPSTREAM_URL)
            .trim_end_matches('/')
            .to_string();
        if upstream_url.is_empty() {
            bail!("VLLM_UPSTREAM_URL must not be empty");
        }

        let metrics_addr = match lookup("VLLM_PROXY_METRICS_ADDR").filter(|v| !v.is_empty()) {
            Some(addr) => Some(addr.parse().context("Invalid VLLM_PROXY_METRICS_ADDR")?),
            None => None,
        };

        let log_format = match var("VLLM_PROXY_LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "text" => LogFormat::Text,
            other => bail!("Invalid VLLM_PROXY_LOG_FORMAT: {}", other),
        };

        Ok(Self {
            host: var("VLLM_PROXY_HOST", "0.0.0.0"),
            port: var("VLLM_PROXY_PORT", "9000")
                .parse()
                .context("Invalid VLLM_PROXY_PORT")?,

            secret,

            upstream_url,
            connect_timeout_seconds: var("VLLM_UPSTREAM_CONNECT_TIMEOUT_SECONDS", "10")
                .parse()
                .context("Invalid VLLM_UPSTREAM_CONNECT_TIMEOUT_SECONDS")?,
            pool_max_idle_per_host: var("VLLM_UPSTREAM_POOL_MAX_IDLE", "100")
                .parse()
                .context("Invalid VLLM_UPSTREAM_POOL_MAX_IDLE")?,

            shutdown_grace_seconds: var("VLLM_PROXY_SHUTDOWN_GRACE_SECONDS", "30")
                .parse()
                .context("Invalid VLLM_PROXY_SHUTDOWN_GRACE_SECONDS")?,

            metrics_addr,
            log_format,
        })
    }

    /// Minimal configuration pointing at a test upstream
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing(secret: &str, upstream_url: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            secret: Secret::new(secret).expect("test secret must not be empty"),
            upstream_url: upstream_url.trim_end_matches('/').to_string(),
            connect_timeout_seconds: 2,
            pool_max_idle_per_host: 10,
            shutdown_grace_seconds: 1,
            metrics_addr: None,
            log_format: LogFormat::Text,
        }
    }
}

/// Resolve the secret from the environment, falling back to the secret file
fn load_secret<F>(lookup: &F) -> Result<Secret>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = lookup(SECRET_VAR).filter(|s| !s.is_empty()) {
        return Secret::new(secret);
    }

    let path = lookup("VLLM_PROXY_SECRET_FILE")
        .map(PathBuf::from)
        .or_else(|| {
            lookup("HOME").map(|home| Path::new(&home).join(".config/vllm-proxy/secret.env"))
        });

    let from_file = match path {
        Some(path) if path.is_file() => read_secret_file(&path)?,
        _ => None,
    };

    match from_file {
        Some(secret) => Secret::new(secret),
        None => bail!(
            "No secret configured. Set {} or create the secret file (VLLM_PROXY_SECRET_FILE)",
            SECRET_VAR
        ),
    }
}

/// Read the secret from the `VLLM_PROXY_SECRET` entry of an env-style file
///
/// The first entry wins; an empty value counts as no secret.
pub fn read_secret_file(path: &Path) -> Result<Option<String>> {
    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("Failed to open secret file {}", path.display()))?;

    for entry in entries {
        let (key, value) =
            entry.with_context(|| format!("Failed to parse secret file {}", path.display()))?;
        if key == SECRET_VAR {
            return Ok(Some(value).filter(|value| !value.is_empty()));
        }
    }

    Ok(None)
}
