//! Runtime orchestration: input driver, queues, terminal controller and the
//! program loop.

pub(crate) mod decoder;
pub mod input_driver;
pub mod program;
pub(crate) mod queue;
pub mod renderer;
pub mod terminal;

pub use input_driver::{term_from_environ, READ_LOOP_TIMEOUT};
pub use program::{Input, Program, ProgramHandle, ProgramOptions, ProgramState};
pub use renderer::{LineRenderer, NullRenderer, Renderer, RendererMode};
pub use terminal::{MouseMode, TerminalModes};
