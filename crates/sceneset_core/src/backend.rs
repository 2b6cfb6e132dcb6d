//! Backend abstraction for loading and unloading scenes
//!
//! The coordinator never loads content itself. It talks to a [`SceneBackend`],
//! which owns the loaded scenes and hands out [`SceneHandle`]s. Backend
//! requests are poll-based: each request returns a [`PendingOperation`] and
//! [`Completion`] turns it into a future that resolves once the backend
//! reports the operation finished.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use crate::error::BackendError;
use crate::reference::IsolationMode;
use crate::SceneHandle;

/// An in-flight backend request that can be polled for completion
pub trait PendingOperation {
    /// Value produced once the operation finishes
    type Output;

    /// Return the result if the operation has finished, `None` while it is still running
    ///
    /// Called repeatedly until it returns `Some`; never called again afterward.
    fn poll_done(&mut self) -> Option<Self::Output>;

    /// Arrange for `waker` to be woken once the operation finishes
    ///
    /// Returns false for operations that can only be polled; [`Completion`]
    /// then re-polls on every executor turn.
    fn register_waker(&mut self, _waker: &Waker) -> bool {
        false
    }
}

/// The external scene loader/unloader
///
/// Implementations must:
/// - load additively (a load never unloads anything already loaded)
/// - process overlapping load requests in order, so that the scene created
///   by a request lands at the index `scene_count()` had when it was issued
/// - keep that index stable: destroying a scene must not shift the index of
///   any other request
/// - treat `unload` of an invalid handle as a finished no-op
pub trait SceneBackend {
    /// Operation type returned by load and unload requests
    type Operation: PendingOperation<Output = Result<(), BackendError>> + Unpin;

    /// Number of load requests that have reserved a scene index so far
    fn scene_count(&self) -> usize;

    /// Handle of the scene requested at `index`, or the null handle if out of range
    ///
    /// The handle may already be stale if that scene was destroyed.
    fn scene_at(&self, index: usize) -> SceneHandle;

    /// Request an additive load of the scene at `path`
    fn load_additive(&self, path: &str, isolation: IsolationMode) -> Result<Self::Operation, BackendError>;

    /// Request destruction of a loaded scene
    fn unload(&self, handle: SceneHandle) -> Result<Self::Operation, BackendError>;

    /// Whether `handle` still refers to a scene the backend knows about
    fn is_valid(&self, handle: SceneHandle) -> bool;

    /// Whether the scene behind `handle` has finished loading
    fn is_loaded(&self, handle: SceneHandle) -> bool;
}

/// Future that polls a [`PendingOperation`] until it finishes
///
/// Operations that support [`PendingOperation::register_waker`] wake the task
/// when they finish; poll-only operations re-schedule the task on every
/// pending poll.
pub struct Completion<O> {
    operation: O,
}

/// Wait for a backend operation to finish
pub fn wait_until_done<O: PendingOperation + Unpin>(operation: O) -> Completion<O> {
    Completion { operation }
}

impl<O: PendingOperation + Unpin> Future for Completion<O> {
    type Output = O::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.operation.poll_done() {
            Some(output) => Poll::Ready(output),
            None => {
                if !self.operation.register_waker(cx.waker()) {
                    cx.waker().wake_by_ref();
                }
                Poll::Pending
            }
        }
    }
}

/// An operation that has already finished
///
/// Useful for backends that complete some requests synchronously.
#[derive(Debug)]
pub struct Finished<T> {
    output: Option<T>,
}

impl<T> Finished<T> {
    /// Wrap an already-available result
    pub fn new(output: T) -> Self {
        Self { output: Some(output) }
    }
}

impl<T> PendingOperation for Finished<T> {
    type Output = T;

    fn poll_done(&mut self) -> Option<T> {
        self.output.take()
    }
}
