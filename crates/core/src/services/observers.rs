use std::sync::{Arc, Mutex, PoisonError, Weak};
use uuid::Uuid;

/// Callback invoked with every published value.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registry of listeners for values of type `T`.
///
/// Listeners are called synchronously, in registration order, outside the
/// registry lock, so a listener may itself subscribe or unsubscribe.
pub struct Observers<T> {
    listeners: Mutex<Vec<(Uuid, Listener<T>)>>,
}

impl<T: 'static> Observers<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Add a listener. It stays registered until the returned
    /// `Subscription` is unsubscribed or dropped.
    pub fn register(self: &Arc<Self>, listener: Listener<T>) -> Subscription {
        let id = Uuid::new_v4();
        self.lock().push((id, listener));
        log::debug!("Listener {id} registered");

        let registry: Arc<dyn Unregister> = self.clone();
        Subscription {
            id,
            registry: Some(Arc::downgrade(&registry)),
        }
    }

    /// Deliver `value` to every listener registered right now.
    pub fn notify(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Uuid, Listener<T>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

trait Unregister: Send + Sync {
    fn unregister(&self, id: Uuid) -> bool;
}

impl<T: 'static> Unregister for Observers<T> {
    fn unregister(&self, id: Uuid) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        before != listeners.len()
    }
}

/// Disposer for one registered listener.
///
/// Unsubscribing twice is harmless, and so is outliving the registry.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: Uuid,
    registry: Option<Weak<dyn Unregister>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .as_ref()
            .is_some_and(|r| r.strong_count() > 0)
    }

    /// Remove the listener. Returns `true` only if this call removed it.
    pub fn unsubscribe(&mut self) -> bool {
        let Some(registry) = self.registry.take() else {
            return false;
        };
        let removed = registry
            .upgrade()
            .is_some_and(|r| r.unregister(self.id));
        if removed {
            log::debug!("Listener {} unregistered", self.id);
        }
        removed
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
