//! Point-in-time network reachability.
//!
//! A `true` answer does not promise the fetch will succeed; callers still
//! handle fetch failure on their own.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

#[async_trait]
pub trait Connectivity: Send + Sync + Debug {
    async fn is_reachable(&self) -> bool;
}

/// Reachable when a TCP connection to `host:port` opens in time.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Probe the host of an `http(s)://` endpoint on its default port.
    pub fn for_endpoint(endpoint: &str, timeout: Duration) -> Option<Self> {
        let url = reqwest::Url::parse(endpoint).ok()?;
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;
        Some(Self::new(host, port, timeout))
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_reachable(&self) -> bool {
        let addr = (self.host.as_str(), self.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, error = %e, "probe failed");
                false
            }
            Err(_) => {
                debug!(host = %self.host, "probe timed out");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_reachable(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

#[async_trait]
impl Connectivity for Offline {
    async fn is_reachable(&self) -> bool {
        false
    }
}
