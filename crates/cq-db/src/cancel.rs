//! Cancellation for running queries.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type InterruptHook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Shared {
    cancelled: AtomicBool,
    hooks: Mutex<Vec<InterruptHook>>,
}

/// Shared stop flag for a running query.
///
/// The connection polls the flag between fetched rows. While a statement is
/// running it may also register an interrupt hook, which `cancel` calls so
/// that the engine stops inside long operators.
#[derive(Clone, Default)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and fire every registered interrupt hook once.
    pub fn cancel(&self) {
        if self.shared.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        for hook in self.hooks().iter() {
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Register `hook` until the returned guard is dropped.
    ///
    /// Fires immediately when the token is already cancelled.
    pub fn interrupt_with<F>(&self, hook: F) -> InterruptGuard<'_>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut hooks = self.hooks();
        if self.is_cancelled() {
            hook();
        }
        hooks.push(Box::new(hook));
        InterruptGuard { token: self }
    }

    fn hooks(&self) -> std::sync::MutexGuard<'_, Vec<InterruptHook>> {
        self.shared.hooks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Removes the token's interrupt hooks when dropped.
pub struct InterruptGuard<'a> {
    token: &'a CancellationToken,
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.token.hooks().clear();
    }
}
