use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Client configuration parameters for network connection management
///
/// Encapsulates the tunable settings for establishing and maintaining the
/// gRPC channel a [`crate::Connection`] wraps.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// Maximum time to wait for establishing a TCP connection
    /// Default: 1 second
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Maximum time to wait for a unary RPC response
    /// Default: 3 seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// TCP keepalive for idle connections
    /// Default: 5 minutes
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_in_secs: u64,

    /// Interval for HTTP/2 keepalive pings
    /// Default: 1 minute
    #[serde(default = "default_http2_keepalive_interval")]
    pub http2_keep_alive_interval_in_secs: u64,

    /// Timeout for HTTP/2 keepalive pings
    /// Default: 20 seconds
    #[serde(default = "default_http2_keepalive_timeout")]
    pub http2_keep_alive_timeout_in_secs: u64,

    /// Enable Gzip compression for network traffic
    /// Default: true
    #[serde(default = "default_enable_compression")]
    pub enable_compression: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            tcp_keepalive_in_secs: default_tcp_keepalive(),
            http2_keep_alive_interval_in_secs: default_http2_keepalive_interval(),
            http2_keep_alive_timeout_in_secs: default_http2_keepalive_timeout(),
            enable_compression: default_enable_compression(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_in_ms == 0 {
            return Err(Error::InvalidConfig("client.connect_timeout_in_ms must be > 0".into()));
        }

        if self.request_timeout_in_ms == 0 {
            return Err(Error::InvalidConfig("client.request_timeout_in_ms must be > 0".into()));
        }

        if self.http2_keep_alive_timeout_in_secs >= self.http2_keep_alive_interval_in_secs {
            return Err(Error::InvalidConfig(format!(
                "client keepalive timeout {}s must be < interval {}s",
                self.http2_keep_alive_timeout_in_secs, self.http2_keep_alive_interval_in_secs
            )));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_in_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }

    pub fn tcp_keepalive(&self) -> Duration {
        Duration::from_secs(self.tcp_keepalive_in_secs)
    }

    pub fn http2_keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.http2_keep_alive_interval_in_secs)
    }

    pub fn http2_keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.http2_keep_alive_timeout_in_secs)
    }
}

fn default_connect_timeout() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    3000
}
fn default_tcp_keepalive() -> u64 {
    300
}
fn default_http2_keepalive_interval() -> u64 {
    60
}
fn default_http2_keepalive_timeout() -> u64 {
    20
}
fn default_enable_compression() -> bool {
    true
}
