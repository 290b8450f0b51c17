//! Core value types: messages, commands, input events, output commands.

pub mod cancel;
pub mod cmd;
pub mod key;
pub mod model;
pub mod mouse;
pub mod msg;
pub mod output;
pub mod terminal;
