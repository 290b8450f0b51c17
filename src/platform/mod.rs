//! Unix terminal integrations.

pub mod cancel_reader;
pub mod signals;
pub(crate) mod sequences;
pub mod tty;

pub use cancel_reader::{
    is_read_canceled, CancelReader, Canceler, ChannelInput, InputSource, ReadOutcome,
};
pub use tty::ProcessTerminal;
