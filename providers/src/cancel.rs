//! Cooperative cancellation for a single in-flight request.
//!
//! A [`CancellationToken`] is moved into exactly one gateway call. Before handing it
//! over, the caller takes a [`StreamHandle`] which can cancel that call from any task.
//! Cancelling only guarantees the result is never delivered; the underlying HTTP
//! request may still run to completion in the background.

use futures_util::future::{AbortHandle, AbortRegistration};

/// Single-use cancellation token for one gateway request.
#[derive(Debug)]
pub struct CancellationToken {
    handle: AbortHandle,
    registration: AbortRegistration,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        let (handle, registration) = AbortHandle::new_pair();
        Self {
            handle,
            registration,
        }
    }

    /// Canceller for the request this token will be attached to.
    #[must_use]
    pub fn handle(&self) -> StreamHandle {
        StreamHandle(self.handle.clone())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }

    pub(crate) fn into_parts(self) -> (AbortHandle, AbortRegistration) {
        (self.handle, self.registration)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable canceller for one in-flight request.
#[derive(Debug, Clone)]
pub struct StreamHandle(AbortHandle);

impl StreamHandle {
    /// Idempotent.
    pub fn cancel(&self) {
        self.0.abort();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_aborted()
    }
}
