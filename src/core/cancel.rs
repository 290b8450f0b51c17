//! Program-wide cancellation token.
//!
//! The token wraps a channel whose only sender is dropped on cancel, so a
//! `recv` on [`CancelToken::done`] becomes ready for every observer at once
//! and can sit in a `crossbeam_channel::select!` next to queue operations.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use crossbeam_channel::{bounded, Receiver, Sender};

/// Why a program run was canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Normal teardown after the event loop returned.
    Shutdown,
    /// [`crate::ProgramHandle::kill`] was called.
    Killed,
    /// The run was interrupted (SIGINT with signal handling enabled).
    Interrupted,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Shutdown => f.write_str("program shutting down"),
            CancelReason::Killed => f.write_str("program killed"),
            CancelReason::Interrupted => f.write_str("program interrupted"),
        }
    }
}

struct Inner {
    reason: OnceLock<CancelReason>,
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, done) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                reason: OnceLock::new(),
                trigger: Mutex::new(Some(trigger)),
                done,
            }),
        }
    }

    /// Cancel with `reason`. Only the first reason sticks; returns whether
    /// this call did the canceling.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        if self.inner.reason.set(reason).is_err() {
            return false;
        }
        let mut trigger = match self.inner.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        trigger.take();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().copied()
    }

    /// Ready (disconnected) once the token is canceled. Never yields a value.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .finish()
    }
}
