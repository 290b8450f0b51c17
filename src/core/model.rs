//! The application contract.

use crate::core::cancel::CancelToken;
use crate::core::cmd::Cmd;
use crate::core::msg::Msg;

/// Application state driven by the program loop.
///
/// The loop owns the model between cycles: `init` and `update` take it by
/// value and hand back its replacement together with an optional command.
pub trait Model: Sized + Send + 'static {
    fn init(self, ctx: &Context) -> (Self, Option<Cmd>);

    fn update(self, ctx: &Context, msg: Msg) -> (Self, Option<Cmd>);

    fn view(&self, ctx: &Context) -> String;
}

/// Read-only runtime facts handed to every model call.
#[derive(Debug, Clone)]
pub struct Context {
    window_size: Option<(u16, u16)>,
    term: Option<String>,
    cancel: CancelToken,
}

impl Context {
    pub(crate) fn new(term: Option<String>, cancel: CancelToken) -> Self {
        Self {
            window_size: None,
            term,
            cancel,
        }
    }

    /// Last size reported by a `WindowSize` message, as `(columns, rows)`.
    pub fn window_size(&self) -> Option<(u16, u16)> {
        self.window_size
    }

    /// The terminal type hint (`TERM`) the input decoder was built with.
    pub fn term(&self) -> Option<&str> {
        self.term.as_deref()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn set_window_size(&mut self, width: u16, height: u16) {
        self.window_size = Some((width, height));
    }
}
