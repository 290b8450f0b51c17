//! The event queue and the error-signaling queue.

use crossbeam_channel::{select, Receiver, Select, Sender};
use tracing::debug;

use crate::core::cancel::{CancelReason, CancelToken};
use crate::core::msg::Msg;
use crate::error::Error;

/// Why [`EventQueue::push_or_stop`] gave up.
#[derive(Debug)]
pub(crate) enum PushAbort {
    Canceled(CancelReason),
    /// The caller's own stop signal fired; the unsent message is returned.
    Stopped(Msg),
}

/// Producer side of the program's queues, cloned into every task.
#[derive(Clone, Debug)]
pub(crate) struct EventQueue {
    msgs: Sender<Msg>,
    errs: Sender<Error>,
    cancel: CancelToken,
}

impl EventQueue {
    pub(crate) fn new(msgs: Sender<Msg>, errs: Sender<Error>, cancel: CancelToken) -> Self {
        Self { msgs, errs, cancel }
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Enqueue `msg`, waiting for room unless the program is canceled first.
    pub(crate) fn push(&self, msg: Msg) -> Result<(), CancelReason> {
        if let Some(reason) = self.cancel.reason() {
            return Err(reason);
        }
        select! {
            send(self.msgs, msg) -> sent => sent.map_err(|_| self.canceled_reason()),
            recv(self.cancel.done()) -> _ => Err(self.canceled_reason()),
        }
    }

    /// Like [`EventQueue::push`], but also gives up when `stop` fires or
    /// disconnects. A message that was not sent comes back in
    /// [`PushAbort::Stopped`].
    pub(crate) fn push_or_stop(&self, msg: Msg, stop: &Receiver<()>) -> Result<(), PushAbort> {
        if let Some(reason) = self.cancel.reason() {
            return Err(PushAbort::Canceled(reason));
        }
        let done = self.cancel.done();
        let mut sel = Select::new();
        let send_index = sel.send(&self.msgs);
        let done_index = sel.recv(done);
        sel.recv(stop);
        let op = sel.select();
        match op.index() {
            index if index == send_index => op
                .send(&self.msgs, msg)
                .map_err(|_| PushAbort::Canceled(self.canceled_reason())),
            index if index == done_index => {
                let _ = op.recv(done);
                Err(PushAbort::Canceled(self.canceled_reason()))
            }
            _ => {
                let _ = op.recv(stop);
                Err(PushAbort::Stopped(msg))
            }
        }
    }

    /// Report a fatal error to the loop. Dropped when the program is already
    /// shutting down; nobody is left to observe it.
    pub(crate) fn report(&self, err: Error) {
        if self.cancel.is_cancelled() {
            debug!(error = %err, "dropping error reported during shutdown");
            return;
        }
        select! {
            send(self.errs, err) -> sent => {
                if let Err(unsent) = sent {
                    debug!(error = %unsent.into_inner(), "error queue closed");
                }
            }
            recv(self.cancel.done()) -> _ => {
                debug!("dropping error reported during shutdown");
            }
        }
    }

    fn canceled_reason(&self) -> CancelReason {
        self.cancel.reason().unwrap_or(CancelReason::Shutdown)
    }
}

/// Consumer side, owned by the event loop.
pub(crate) struct QueueReceivers {
    pub(crate) msgs: Receiver<Msg>,
    pub(crate) errs: Receiver<Error>,
}

pub(crate) fn queues(capacity: usize, cancel: CancelToken) -> (EventQueue, QueueReceivers) {
    let (msg_tx, msg_rx) = crossbeam_channel::bounded(capacity.max(1));
    let (err_tx, err_rx) = crossbeam_channel::bounded(4);
    (
        EventQueue::new(msg_tx, err_tx, cancel),
        QueueReceivers {
            msgs: msg_rx,
            errs: err_rx,
        },
    )
}
