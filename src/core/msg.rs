//! Events delivered to the update function.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::core::cmd::Cmd;
use crate::core::key::KeyMsg;
use crate::core::mouse::MouseMsg;

/// An event.
///
/// The first group of variants is delivered to [`crate::Model::update`]. The
/// control variants (`Quit` through `Sequence`) are consumed by the program
/// loop and never reach the model.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    Key(KeyMsg),
    Mouse(MouseMsg),
    Paste(String),
    Focus,
    Blur,
    WindowSize { width: u16, height: u16 },
    Resume,
    Error(ErrorMsg),
    Custom(CustomMsg),

    Quit,
    Interrupt,
    Suspend,
    RequestWindowSize,
    Terminal(TerminalRequest),
    Batch(Commands),
    Sequence(Commands),
}

impl Msg {
    /// Wrap an application-defined value.
    pub fn custom<T>(value: T) -> Self
    where
        T: Any + fmt::Debug + PartialEq + Send + Sync,
    {
        Msg::Custom(CustomMsg::new(value))
    }

    /// Wrap an error as an event.
    pub fn error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Msg::Error(ErrorMsg::new(err))
    }

    /// Borrow the payload of a `Custom` message as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Msg::Custom(custom) => custom.downcast_ref(),
            _ => None,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Msg::Quit
                | Msg::Interrupt
                | Msg::Suspend
                | Msg::RequestWindowSize
                | Msg::Terminal(_)
                | Msg::Batch(_)
                | Msg::Sequence(_)
        )
    }
}

impl From<KeyMsg> for Msg {
    fn from(key: KeyMsg) -> Self {
        Msg::Key(key)
    }
}

impl From<MouseMsg> for Msg {
    fn from(mouse: MouseMsg) -> Self {
        Msg::Mouse(mouse)
    }
}

/// Error payload carried by [`Msg::Error`].
///
/// Two values are equal when they share the same allocation or render the
/// same message.
#[derive(Clone)]
pub struct ErrorMsg(Arc<dyn std::error::Error + Send + Sync>);

impl ErrorMsg {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    pub fn get(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl PartialEq for ErrorMsg {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
            || self.0.to_string() == other.0.to_string()
    }
}

impl fmt::Debug for ErrorMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorMsg").field(&self.0.to_string()).finish()
    }
}

impl fmt::Display for ErrorMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Object-safe view of an application payload.
pub trait AppMsg: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_msg(&self, other: &dyn AppMsg) -> bool;
}

impl<T> AppMsg for T
where
    T: Any + fmt::Debug + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_msg(&self, other: &dyn AppMsg) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

#[derive(Clone)]
pub struct CustomMsg(Arc<dyn AppMsg>);

impl CustomMsg {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + fmt::Debug + PartialEq + Send + Sync,
    {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.as_any().is::<T>()
    }
}

impl PartialEq for CustomMsg {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_msg(other.0.as_ref())
    }
}

impl fmt::Debug for CustomMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Terminal mode changes requested by commands and applied by the
/// terminal controller on the loop thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalRequest {
    EnterAltScreen,
    ExitAltScreen,
    ShowCursor,
    HideCursor,
    ClearScreen,
    EnableBracketedPaste,
    DisableBracketedPaste,
    EnableMouseCellMotion,
    EnableMouseAllMotion,
    DisableMouse,
    EnableReportFocus,
    DisableReportFocus,
    EnableKittyKeyboard(u8),
    DisableKittyKeyboard,
    EnableModifyOtherKeys(u8),
    DisableModifyOtherKeys,
    EnableGraphemeClustering,
    DisableGraphemeClustering,
    SetWindowTitle(String),
}

/// A take-once list of commands carried by `Batch`/`Sequence` messages.
///
/// Cloning shares the list; the loop takes it exactly once, so each command
/// still runs at most once.
#[derive(Clone, Default)]
pub struct Commands(Arc<Mutex<Vec<Cmd>>>);

impl Commands {
    pub fn new(cmds: Vec<Cmd>) -> Self {
        Self(Arc::new(Mutex::new(cmds)))
    }

    pub fn take(&self) -> Vec<Cmd> {
        let mut cmds = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *cmds)
    }

    pub fn len(&self) -> usize {
        match self.0.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for Commands {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Commands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commands({})", self.len())
    }
}
