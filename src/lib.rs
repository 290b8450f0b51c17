//! A message-driven terminal application runtime.
//!
//! Invariant: single output gate. Only `core::output::OutputGate::flush(..)`
//! writes to the terminal, and only the program loop owns the gate.
//!
//! # Public API Overview
//! - Implement [`Model`] and hand it to [`Program`]; `run` returns the final
//!   model once it quits.
//! - Express side effects as [`Cmd`]s. Combinators live in [`cmd`]:
//!   [`cmd::tick`], [`cmd::every`], [`cmd::sequentially`], [`cmd::batch`],
//!   [`cmd::sequence`], plus control commands such as [`cmd::quit`].
//! - Drive a program from other threads with [`ProgramHandle`].
//! - Swap the terminal, input source or renderer through the [`Terminal`],
//!   [`InputSource`] and [`Renderer`] seams.
//!
//! The runtime targets Unix terminals.

pub mod config;
pub mod error;
pub mod logging;

pub mod core;
pub mod platform;
pub mod runtime;

/// Command constructors and combinators.
pub use crate::core::cmd;
pub use crate::core::cmd::Cmd;

/// Events and their payloads.
pub use crate::core::key::{KeyEventType, KeyMsg};
pub use crate::core::mouse::{MouseAction, MouseButton, MouseMsg};
pub use crate::core::msg::{AppMsg, Commands, CustomMsg, ErrorMsg, Msg, TerminalRequest};

/// The application contract.
pub use crate::core::model::{Context, Model};

/// Cancellation shared by every task of a program run.
pub use crate::core::cancel::{CancelReason, CancelToken};

/// Terminal seam and the descriptor-backed implementation.
pub use crate::core::output::{OutputGate, TerminalCmd};
pub use crate::core::terminal::{SizeProbe, Terminal};
pub use crate::platform::ProcessTerminal;

/// Input sources.
pub use crate::platform::{CancelReader, Canceler, ChannelInput, InputSource, ReadOutcome};

/// The program runtime.
pub use crate::runtime::{
    Input, LineRenderer, MouseMode, NullRenderer, Program, ProgramHandle, ProgramOptions,
    ProgramState, Renderer, RendererMode, TerminalModes,
};

pub use crate::config::EnvConfig;
pub use crate::error::{DriverError, Error, Result};
