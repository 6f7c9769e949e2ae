use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Synchronization parameters of one client [`crate::Session`]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Broadcast tick requested from the server
    #[serde(default = "default_update_interval")]
    pub update_interval_in_ms: u64,

    /// Cadence at which resources commit locally edited values and
    /// refresh the locks they hold
    #[serde(default = "default_commit_interval")]
    pub commit_interval_in_ms: u64,

    /// Duration requested with every lock; locks are refreshed before half
    /// of it has elapsed
    #[serde(default = "default_lock_duration")]
    pub lock_duration_in_ms: u64,

    /// Send one release batch for every held lock when the session closes
    #[serde(default = "default_release_locks_on_close")]
    pub release_locks_on_close: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            update_interval_in_ms: default_update_interval(),
            commit_interval_in_ms: default_commit_interval(),
            lock_duration_in_ms: default_lock_duration(),
            release_locks_on_close: default_release_locks_on_close(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.commit_interval_in_ms == 0 {
            return Err(Error::InvalidConfig("session.commit_interval_in_ms must be > 0".into()));
        }

        if self.lock_duration_in_ms == 0 {
            return Err(Error::InvalidConfig("session.lock_duration_in_ms must be > 0".into()));
        }

        let two_commits = self.commit_interval_in_ms.checked_mul(2);
        if two_commits.map_or(true, |ms| ms > self.lock_duration_in_ms) {
            return Err(Error::InvalidConfig(format!(
                "session lock duration {}ms must be at least twice the commit interval {}ms",
                self.lock_duration_in_ms, self.commit_interval_in_ms
            )));
        }

        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_in_ms)
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_in_ms)
    }

    pub fn lock_duration(&self) -> Duration {
        Duration::from_millis(self.lock_duration_in_ms)
    }
}

fn default_update_interval() -> u64 {
    // 30 pushes per second
    33
}

fn default_commit_interval() -> u64 {
    33
}

fn default_lock_duration() -> u64 {
    5_000
}

fn default_release_locks_on_close() -> bool {
    true
}
