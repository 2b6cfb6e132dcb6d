//! Opaque handles to loaded scene instances

use slotmap::{new_key_type, Key};

new_key_type! {
    /// Handle to a loaded scene instance
    ///
    /// Uses generational indexing: once the scene behind a handle is destroyed,
    /// the handle never compares equal to a scene that later reuses its slot.
    /// The null handle never refers to a scene.
    pub struct SceneHandle;
}

impl SceneHandle {
    /// The invalid handle, returned for unspecified references
    #[inline]
    pub fn null() -> Self {
        <Self as Key>::null()
    }

    /// Whether this is the null handle
    ///
    /// A non-null handle may still be stale; ask the backend
    /// ([`SceneBackend::is_valid`](crate::SceneBackend::is_valid)) for liveness.
    #[inline]
    pub fn is_null(&self) -> bool {
        Key::is_null(self)
    }
}
