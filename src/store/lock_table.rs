use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::AccessToken;
use crate::Value;

/// What a single key of an `UpdateLocks` batch asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LockRequest {
    /// Take (or refresh) the lock for the given duration
    Acquire(Duration),
    Release,
}

impl LockRequest {
    /// Interprets a wire value: `null` releases, a number is a duration in
    /// seconds capped at `max`. Anything else (including negative or
    /// non-finite numbers) asks for `max`.
    pub fn from_value(
        value: &Value,
        max: Duration,
    ) -> Self {
        match value {
            Value::Null => LockRequest::Release,
            Value::Number(secs) => LockRequest::Acquire(
                Duration::try_from_secs_f64(*secs)
                    .map(|d| d.min(max))
                    .unwrap_or(max),
            ),
            _ => LockRequest::Acquire(max),
        }
    }

    pub fn to_value(self) -> Value {
        match self {
            LockRequest::Acquire(duration) => Value::Number(duration.as_secs_f64()),
            LockRequest::Release => Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockEntry {
    pub holder: AccessToken,
    pub expires_at: Instant,
}

/// Key to lock holder mapping.
///
/// An expired entry is treated as absent by every lookup and is dropped the
/// first time a lookup trips over it. Callers serialize per-key access; the
/// table itself only guarantees per-call consistency.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<String, LockEntry>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of `key`, if the lock exists and has not expired.
    pub fn holder(
        &self,
        key: &str,
        now: Instant,
    ) -> Option<AccessToken> {
        match self.locks.get(key) {
            None => return None,
            Some(entry) if entry.expires_at > now => return Some(entry.holder.clone()),
            Some(_) => {}
        };

        self.locks.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    /// True when `key` is unlocked or locked by `token` itself.
    pub fn is_available_to(
        &self,
        key: &str,
        token: &AccessToken,
        now: Instant,
    ) -> bool {
        self.holder(key, now).map_or(true, |holder| &holder == token)
    }

    pub(crate) fn grant(
        &self,
        key: &str,
        holder: &AccessToken,
        expires_at: Instant,
    ) {
        self.locks.insert(
            key.to_string(),
            LockEntry {
                holder: holder.clone(),
                expires_at,
            },
        );
    }

    /// Removes the lock on `key` if `holder` owns it.
    pub(crate) fn release(
        &self,
        key: &str,
        holder: &AccessToken,
    ) -> bool {
        self.locks.remove_if(key, |_, entry| &entry.holder == holder).is_some()
    }

    /// Removes the lock on `key` whoever holds it.
    pub(crate) fn force_release(
        &self,
        key: &str,
    ) -> bool {
        self.locks.remove(key).is_some()
    }

    /// Removes every lock held by `holder` and returns the released keys.
    pub(crate) fn release_all(
        &self,
        holder: &AccessToken,
    ) -> Vec<String> {
        let keys: Vec<String> = self
            .locks
            .iter()
            .filter(|entry| &entry.holder == holder)
            .map(|entry| entry.key().clone())
            .collect();

        keys.into_iter().filter(|key| self.release(key, holder)).collect()
    }

    /// Number of locks that are still live at `now`.
    pub fn live_count(
        &self,
        now: Instant,
    ) -> usize {
        self.locks.iter().filter(|entry| entry.expires_at > now).count()
    }
}
