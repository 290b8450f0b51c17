//! Program and input-driver error types.

use std::io;

use crate::core::cancel::CancelReason;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal conditions returned from [`crate::Program::run`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("program was killed")]
    Killed,
    #[error("program was interrupted")]
    Interrupted,
    #[error("program panicked: {0}")]
    Panic(String),
    #[error("error reading input: {0}")]
    Driver(#[from] DriverError),
    #[error("error restoring terminal: {0}")]
    Restore(#[source] io::Error),
    #[error("error querying terminal size: {0}")]
    ResizeQuery(#[source] io::Error),
    #[error("error initializing terminal: {0}")]
    TerminalInit(#[source] io::Error),
    #[error("error opening input: {0}")]
    Input(#[source] io::Error),
    #[error("error registering signal handlers: {0}")]
    Signals(#[source] io::Error),
    #[error("error writing to terminal: {0}")]
    Output(#[source] io::Error),
    #[error("error setting up logging: {0}")]
    Logging(String),
}

impl Error {
    pub(crate) fn from_cancel(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Killed => Error::Killed,
            CancelReason::Interrupted => Error::Interrupted,
            CancelReason::Shutdown => Error::Driver(DriverError::Canceled(reason)),
        }
    }
}

/// Why the input read loop stopped.
///
/// `Eof` and `ReadCanceled` are benign: the loop ends silently. Everything
/// else is reported once through the error queue unless the program is
/// already shutting down.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("end of input")]
    Eof,
    #[error("read canceled")]
    ReadCanceled,
    #[error("found cancellation while reading input: {0}")]
    Canceled(CancelReason),
    #[error(transparent)]
    Read(#[from] io::Error),
}

impl DriverError {
    pub fn is_benign(&self) -> bool {
        matches!(self, DriverError::Eof | DriverError::ReadCanceled)
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}
