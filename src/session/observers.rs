use std::fmt;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::RwLock;
use tracing::trace;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<E>)>,
}

/// Explicit observer registration for events of type `E`.
///
/// Callbacks run synchronously on the notifying task, outside any lock of the
/// registry, so a callback may subscribe or unsubscribe.
pub(crate) struct Observers<E> {
    registry: Arc<RwLock<Registry<E>>>,
}

impl<E> Clone for Observers<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry {
                next_id: 1,
                callbacks: Vec::new(),
            })),
        }
    }
}

impl<E: 'static> Observers<E> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe<F>(
        &self,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.registry.write();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.callbacks.push((id, Arc::new(callback)));
            id
        };

        let registry: Weak<RwLock<Registry<E>>> = Arc::downgrade(&self.registry);
        Subscription {
            id,
            cleanup: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.write().callbacks.retain(|(other, _)| *other != id);
                }
            })),
        }
    }

    pub(crate) fn notify(
        &self,
        event: &E,
    ) {
        let callbacks: Vec<Callback<E>> = self
            .registry
            .read()
            .callbacks
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.registry.read().callbacks.len()
    }
}

/// Registration of one observer. Dropping it unregisters the observer.
pub struct Subscription {
    id: u64,
    cleanup: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Keeps the observer registered for as long as its source lives.
    pub fn detach(mut self) {
        self.cleanup.take();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &self.cleanup.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
            trace!(subscription = self.id, "observer unregistered");
        }
    }
}
