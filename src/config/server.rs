use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Longest lock a server grants, whatever `max_lock_duration_in_ms` says
pub const LOCK_DURATION_CEILING_IN_MS: u64 = 86_400_000;

/// Longest artificial broadcast delay
pub const BROADCAST_LATENCY_CEILING_IN_MS: u64 = 60_000;

/// Store and broadcast parameters of the authoritative server
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_address: SocketAddr,

    /// Floor applied to the update interval a subscriber requests
    #[serde(default = "default_min_broadcast_interval")]
    pub min_broadcast_interval_in_ms: u64,

    /// Changes are held back this long before they become eligible for a
    /// broadcast. Zero in production; raised to exercise latency tolerance.
    #[serde(default)]
    pub broadcast_latency_in_ms: u64,

    /// Upper bound on the duration a single lock request may ask for
    #[serde(default = "default_max_lock_duration")]
    pub max_lock_duration_in_ms: u64,

    /// Outgoing update batches buffered per subscriber before backpressure
    #[serde(default = "default_subscriber_buffer_size")]
    pub subscriber_buffer_size: usize,

    /// Enable Gzip compression for responses
    #[serde(default = "default_enable_compression")]
    pub enable_compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_addr(),
            min_broadcast_interval_in_ms: default_min_broadcast_interval(),
            broadcast_latency_in_ms: 0,
            max_lock_duration_in_ms: default_max_lock_duration(),
            subscriber_buffer_size: default_subscriber_buffer_size(),
            enable_compression: default_enable_compression(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_broadcast_interval_in_ms == 0 {
            return Err(Error::InvalidConfig(
                "server.min_broadcast_interval_in_ms must be > 0".into(),
            ));
        }

        if self.max_lock_duration_in_ms == 0 {
            return Err(Error::InvalidConfig(
                "server.max_lock_duration_in_ms must be > 0".into(),
            ));
        }

        if self.max_lock_duration_in_ms > LOCK_DURATION_CEILING_IN_MS {
            return Err(Error::InvalidConfig(format!(
                "server.max_lock_duration_in_ms {} exceeds {}",
                self.max_lock_duration_in_ms, LOCK_DURATION_CEILING_IN_MS
            )));
        }

        if self.broadcast_latency_in_ms > BROADCAST_LATENCY_CEILING_IN_MS {
            return Err(Error::InvalidConfig(format!(
                "server.broadcast_latency_in_ms {} exceeds {}",
                self.broadcast_latency_in_ms, BROADCAST_LATENCY_CEILING_IN_MS
            )));
        }

        if self.subscriber_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "server.subscriber_buffer_size must be > 0".into(),
            ));
        }

        Ok(())
    }

    // The accessors below clamp to what the store can run with, so an
    // unvalidated config cannot stall a flush task or overflow an expiry.

    pub fn min_broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.min_broadcast_interval_in_ms.max(1))
    }

    pub fn broadcast_latency(&self) -> Duration {
        Duration::from_millis(self.broadcast_latency_in_ms.min(BROADCAST_LATENCY_CEILING_IN_MS))
    }

    pub fn max_lock_duration(&self) -> Duration {
        Duration::from_millis(self.max_lock_duration_in_ms.clamp(1, LOCK_DURATION_CEILING_IN_MS))
    }

    pub fn subscriber_buffer_size(&self) -> usize {
        self.subscriber_buffer_size.max(1)
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 38801))
}

fn default_min_broadcast_interval() -> u64 {
    10
}

fn default_max_lock_duration() -> u64 {
    60_000
}

fn default_subscriber_buffer_size() -> usize {
    64
}

fn default_enable_compression() -> bool {
    true
}
