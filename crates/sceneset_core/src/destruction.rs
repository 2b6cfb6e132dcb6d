//! Scene destruction notifications
//!
//! Whoever owns loaded scenes fires [`DestructionChannel::notify_destroyed`]
//! every time a scene is destroyed, no matter what caused it. Scene sets
//! subscribe so they can forget template instances that no longer exist.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::SceneHandle;

new_key_type! {
    /// Identifies one subscription on a [`DestructionChannel`]
    pub struct SubscriptionId;
}

type DestroyedHandler = Arc<dyn Fn(SceneHandle) + Send + Sync>;

/// Publish/subscribe point for "scene destroyed" events
#[derive(Default)]
pub struct DestructionChannel {
    handlers: Mutex<SlotMap<SubscriptionId, DestroyedHandler>>,
}

impl DestructionChannel {
    /// Create a private channel (tests, or hosts that don't use the global one)
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide channel
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<DestructionChannel>> = OnceLock::new();
        GLOBAL.get_or_init(DestructionChannel::new).clone()
    }

    /// Register a handler called with the handle of every destroyed scene
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(SceneHandle) + Send + Sync + 'static,
    {
        self.handlers.lock().insert(Arc::new(handler))
    }

    /// Remove a subscription
    ///
    /// Returns false if it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.handlers.lock().remove(id).is_some()
    }

    /// Tell every subscriber that `handle` was destroyed
    ///
    /// Handlers run synchronously on the calling thread, outside the channel
    /// lock, so a handler may subscribe or unsubscribe.
    pub fn notify_destroyed(&self, handle: SceneHandle) {
        let handlers: Vec<DestroyedHandler> = self.handlers.lock().values().cloned().collect();
        log::trace!("Scene {:?} destroyed, notifying {} subscribers", handle, handlers.len());
        for handler in handlers {
            handler(handle);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl std::fmt::Debug for DestructionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestructionChannel")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
