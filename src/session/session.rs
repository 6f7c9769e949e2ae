use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Observers;
use super::PendingWrite;
use super::Subscription;
use crate::network::Connection;
use crate::network::StateClient;
use crate::network::StateStream;
use crate::proto::StateUpdate;
use crate::proto::SubscribeStateUpdatesRequest;
use crate::proto::UpdateLocksRequest;
use crate::proto::UpdateStateRequest;
use crate::AccessToken;
use crate::CollectionCodec;
use crate::LockRequest;
use crate::Result;
use crate::SessionConfig;
use crate::SharedCollection;
use crate::SharedResource;
use crate::StateChanges;
use crate::Value;

/// One change applied to the mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Updated { key: String, value: Value },
    Removed { key: String },
}

impl StateChange {
    pub fn key(&self) -> &str {
        match self {
            StateChange::Updated { key, .. } | StateChange::Removed { key } => key,
        }
    }
}

/// A client's view of the shared state.
///
/// The session owns one client scope and one update stream. The mirror is
/// only ever written by that stream: a write issued through the session
/// becomes visible once the server has applied it and pushed it back.
///
/// Cloning is cheap and shares the same mirror, client and stream.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    access_token: AccessToken,
    client: StateClient,
    config: SessionConfig,
    mirror: RwLock<HashMap<String, Value>>,
    observers: Observers<StateChange>,
    held_locks: Mutex<HashSet<String>>,
    stream: Mutex<Option<StateStream>>,
}

impl fmt::Debug for Session {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &self.inner.access_token)
            .field("keys", &self.inner.mirror.read().len())
            .finish()
    }
}

impl Session {
    /// Opens a session on `connection` and subscribes to state updates.
    pub async fn open(
        connection: &Connection,
        config: SessionConfig,
    ) -> Result<Session> {
        config.validate()?;
        let client = connection.client()?;
        let request = SubscribeStateUpdatesRequest {
            update_interval: config.update_interval().as_secs_f32(),
        };

        let inner = Arc::new(SessionInner {
            access_token: AccessToken::generate(),
            client,
            config,
            mirror: RwLock::new(HashMap::new()),
            observers: Observers::new(),
            held_locks: Mutex::new(HashSet::new()),
            stream: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let stream = inner
            .client
            .open_stream(request, move |update| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_update(update);
                }
            })
            .await?;
        *inner.stream.lock() = Some(stream);

        info!(access_token = %inner.access_token, "session opened");
        Ok(Session { inner })
    }

    pub fn access_token(&self) -> &AccessToken {
        &self.inner.access_token
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub(crate) fn client(&self) -> &StateClient {
        &self.inner.client
    }

    //---
    // Reads. Always served from the mirror.

    pub fn get_shared_state(
        &self,
        key: &str,
    ) -> Option<Value> {
        self.inner.mirror.read().get(key).cloned()
    }

    /// Copy of the whole mirror.
    pub fn shared_state(&self) -> HashMap<String, Value> {
        self.inner.mirror.read().clone()
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.inner.mirror.read().contains_key(key)
    }

    pub(crate) fn entries_with_prefix(
        &self,
        prefix: &str,
    ) -> Vec<(String, Value)> {
        self.inner
            .mirror
            .read()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Registers `callback` for every upsert and removal applied to the
    /// mirror. Removing a key the mirror never had is not reported.
    pub fn on_change<F>(
        &self,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(callback)
    }

    //---
    // Fire-and-forget writes

    pub fn set_shared_state(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> PendingWrite {
        self.update_shared_state(StateChanges::new().with_upsert(key, value))
    }

    pub fn remove_shared_state_key(
        &self,
        key: impl Into<String>,
    ) -> PendingWrite {
        self.update_shared_state(StateChanges::new().with_removal(key))
    }

    /// Sends `changes` as one all-or-nothing batch.
    pub fn update_shared_state(
        &self,
        changes: StateChanges,
    ) -> PendingWrite {
        let session = self.clone();
        PendingWrite::spawn(&self.inner.client, "update_state", async move {
            session.request_update(changes).await
        })
    }

    /// Sends one all-or-nothing lock batch.
    pub fn update_locks(
        &self,
        requests: impl IntoIterator<Item = (String, LockRequest)>,
    ) -> PendingWrite {
        let requests: BTreeMap<String, LockRequest> = requests.into_iter().collect();
        let session = self.clone();
        PendingWrite::spawn(&self.inner.client, "update_locks", async move {
            session.request_locks(requests).await
        })
    }

    pub(crate) async fn request_update(
        &self,
        changes: StateChanges,
    ) -> Result<bool> {
        let request = UpdateStateRequest {
            access_token: self.inner.access_token.to_string(),
            update: Some(changes.into()),
        };
        Ok(self.inner.client.update_state(request).await?.success)
    }

    /// Sends a lock batch and keeps track of the locks this session holds.
    pub(crate) async fn request_locks(
        &self,
        requests: BTreeMap<String, LockRequest>,
    ) -> Result<bool> {
        // Releases are assumed to succeed; forget them up front.
        {
            let mut held = self.inner.held_locks.lock();
            for (key, request) in &requests {
                if *request == LockRequest::Release {
                    held.remove(key);
                }
            }
        }

        let acquired: Vec<String> = requests
            .iter()
            .filter(|(_, request)| matches!(request, LockRequest::Acquire(_)))
            .map(|(key, _)| key.clone())
            .collect();

        let request = UpdateLocksRequest {
            access_token: self.inner.access_token.to_string(),
            lock_keys: Some(prost_types::Struct {
                fields: requests
                    .into_iter()
                    .map(|(key, request)| (key, request.to_value().into()))
                    .collect(),
            }),
        };
        let success = self.inner.client.update_locks(request).await?.success;

        if success && !acquired.is_empty() {
            self.inner.held_locks.lock().extend(acquired);
        }
        Ok(success)
    }

    /// Keys whose locks this session believes it holds.
    pub fn held_locks(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.held_locks.lock().iter().cloned().collect();
        keys.sort();
        keys
    }

    //---
    // Typed facades

    /// Typed accessor with a lock state machine for `key`.
    pub fn get_shared_resource<T>(
        &self,
        key: impl Into<String>,
    ) -> Result<SharedResource<T>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        SharedResource::new(self.clone(), key.into())
    }

    /// Typed view over every key starting with `prefix`, decoded with serde.
    pub fn get_collection<T>(
        &self,
        prefix: impl Into<String>,
    ) -> SharedCollection<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        SharedCollection::new(self.clone(), prefix.into(), CollectionCodec::serde())
    }

    pub fn get_collection_with_codec<T>(
        &self,
        prefix: impl Into<String>,
        codec: CollectionCodec<T>,
    ) -> SharedCollection<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        SharedCollection::new(self.clone(), prefix.into(), codec)
    }

    //---
    // Lifecycle

    /// Whether the update stream is still delivering.
    pub fn is_streaming(&self) -> bool {
        self.inner
            .stream
            .lock()
            .as_ref()
            .map_or(false, |stream| !stream.is_cancelled())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.client.is_cancelled()
    }

    /// Cancels the client scope right away. Held locks are left to expire.
    pub fn cancel(&self) {
        self.inner.client.cancel();
    }

    /// Releases held locks (if configured), then closes the client scope and
    /// waits for its tasks. The mirror keeps its last state.
    pub async fn close(&self) {
        if self.inner.config.release_locks_on_close && !self.inner.client.is_cancelled() {
            let held: BTreeMap<String, LockRequest> = self
                .inner
                .held_locks
                .lock()
                .iter()
                .map(|key| (key.clone(), LockRequest::Release))
                .collect();

            if !held.is_empty() {
                debug!(count = held.len(), "releasing held locks before close");
                if let Err(e) = self.request_locks(held).await {
                    warn!("failed to release locks on close: {:?}", e);
                }
            }
        }

        self.inner.client.close().await;
        debug!(access_token = %self.inner.access_token, "session closed");
    }
}

impl SessionInner {
    /// Applies one pushed batch. The mirror lock is released before any
    /// observer runs.
    fn apply_update(
        &self,
        update: StateUpdate,
    ) {
        let changes = StateChanges::from(update);
        let mut events = Vec::with_capacity(changes.len());
        {
            let mut mirror = self.mirror.write();
            for (key, change) in changes {
                match change {
                    Some(value) => {
                        mirror.insert(key.clone(), value.clone());
                        events.push(StateChange::Updated { key, value });
                    }
                    None => {
                        if mirror.remove(&key).is_some() {
                            events.push(StateChange::Removed { key });
                        }
                    }
                }
            }
        }

        for event in &events {
            self.observers.notify(event);
        }
    }
}
