//! The terminal controller: raw mode and optional terminal modes.
//!
//! Only the event loop touches the controller, so mode flags and the saved
//! descriptor state have a single writer.

use std::io;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::msg::TerminalRequest;
use crate::core::output::{OutputGate, TerminalCmd};
use crate::core::terminal::{SizeProbe, Terminal};
use crate::runtime::renderer::{Renderer, RendererMode};

/// Pause after leaving the alternate screen so the emulator settles before
/// the shell takes over.
const ALT_SCREEN_SETTLE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseMode {
    #[default]
    Off,
    CellMotion,
    AllMotion,
}

/// Optional terminal modes, used both for the modes requested at startup
/// and for the modes currently active.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TerminalModes {
    pub alt_screen: bool,
    pub hide_cursor: bool,
    pub bracketed_paste: bool,
    pub mouse: MouseMode,
    /// modifyOtherKeys level, 0 when off.
    pub modify_other_keys: u8,
    /// Kitty keyboard flags, 0 when off.
    pub kitty_flags: u8,
    pub report_focus: bool,
    pub grapheme_clustering: bool,
}

pub(crate) struct TerminalController {
    terminal: Box<dyn Terminal>,
    renderer: Box<dyn Renderer>,
    out: OutputGate,
    active: TerminalModes,
    /// Modes that were active when the terminal was last released.
    released: Option<TerminalModes>,
}

impl TerminalController {
    pub(crate) fn new(terminal: Box<dyn Terminal>, renderer: Box<dyn Renderer>) -> Self {
        Self {
            terminal,
            renderer,
            out: OutputGate::new(),
            active: TerminalModes::default(),
            released: None,
        }
    }

    pub(crate) fn size_probe(&self) -> Option<SizeProbe> {
        self.terminal.size_probe()
    }

    pub(crate) fn modes(&self) -> TerminalModes {
        let mut modes = self.active.clone();
        modes.alt_screen = self.renderer.mode(RendererMode::AltScreen);
        modes.hide_cursor = self.renderer.mode(RendererMode::HideCursor);
        modes
    }

    /// Enter raw mode and switch on `modes`.
    pub(crate) fn start(&mut self, modes: &TerminalModes) -> io::Result<()> {
        self.terminal.enter_raw_mode()?;
        self.enable(modes);
        self.flush()
    }

    pub(crate) fn apply(&mut self, request: TerminalRequest) -> io::Result<()> {
        debug!(?request, "terminal request");
        match request {
            TerminalRequest::EnterAltScreen => self.set_renderer_mode(RendererMode::AltScreen, true),
            TerminalRequest::ExitAltScreen => self.set_renderer_mode(RendererMode::AltScreen, false),
            TerminalRequest::HideCursor => self.set_renderer_mode(RendererMode::HideCursor, true),
            TerminalRequest::ShowCursor => self.set_renderer_mode(RendererMode::HideCursor, false),
            TerminalRequest::ClearScreen => {
                self.out.push(TerminalCmd::ClearScreen);
                self.renderer.invalidate();
            }
            TerminalRequest::EnableBracketedPaste => self.set_bracketed_paste(true),
            TerminalRequest::DisableBracketedPaste => self.set_bracketed_paste(false),
            TerminalRequest::EnableMouseCellMotion => self.set_mouse(MouseMode::CellMotion),
            TerminalRequest::EnableMouseAllMotion => self.set_mouse(MouseMode::AllMotion),
            TerminalRequest::DisableMouse => self.set_mouse(MouseMode::Off),
            TerminalRequest::EnableReportFocus => self.set_report_focus(true),
            TerminalRequest::DisableReportFocus => self.set_report_focus(false),
            TerminalRequest::EnableKittyKeyboard(flags) => self.set_kitty_flags(flags),
            TerminalRequest::DisableKittyKeyboard => self.set_kitty_flags(0),
            TerminalRequest::EnableModifyOtherKeys(level) => self.set_modify_other_keys(level),
            TerminalRequest::DisableModifyOtherKeys => self.set_modify_other_keys(0),
            TerminalRequest::EnableGraphemeClustering => self.set_grapheme_clustering(true),
            TerminalRequest::DisableGraphemeClustering => self.set_grapheme_clustering(false),
            TerminalRequest::SetWindowTitle(title) => self.out.push(TerminalCmd::SetTitle(title)),
        }
        self.flush()
    }

    pub(crate) fn render(&mut self, view: &str) -> io::Result<()> {
        self.renderer.render(view, &mut self.out);
        self.flush()
    }

    pub(crate) fn resize(&mut self, width: u16, height: u16) {
        self.renderer.resize(width, height);
    }

    /// Switch every active mode off, then restore the saved descriptor
    /// modes. Modes go off input-affecting first and the alternate screen
    /// last. A controller with nothing active writes nothing.
    ///
    /// Every step is attempted; the first failure is returned.
    pub(crate) fn restore_state(&mut self) -> io::Result<()> {
        let snapshot = self.modes();
        if snapshot != TerminalModes::default() {
            self.released = Some(snapshot);
        }

        self.set_bracketed_paste(false);
        self.set_renderer_mode(RendererMode::HideCursor, false);
        self.set_mouse(MouseMode::Off);
        self.set_modify_other_keys(0);
        self.set_kitty_flags(0);
        self.set_report_focus(false);
        self.set_grapheme_clustering(false);

        let leaving_alt_screen = self.renderer.mode(RendererMode::AltScreen);
        self.set_renderer_mode(RendererMode::AltScreen, false);

        let flushed = self.flush();
        if let Err(err) = &flushed {
            warn!(error = %err, "failed to write terminal mode resets");
        }
        if leaving_alt_screen {
            thread::sleep(ALT_SCREEN_SETTLE);
        }

        let restored = self.terminal.restore_mode();
        flushed.and(restored)
    }

    /// Take the terminal back after `restore_state`: raw mode again and the
    /// modes that were active before the release.
    pub(crate) fn reacquire(&mut self) -> io::Result<()> {
        self.terminal.enter_raw_mode()?;
        if let Some(modes) = self.released.take() {
            self.enable(&modes);
        }
        self.renderer.invalidate();
        self.flush()
    }

    fn enable(&mut self, modes: &TerminalModes) {
        if modes.alt_screen {
            self.set_renderer_mode(RendererMode::AltScreen, true);
        }
        if modes.hide_cursor {
            self.set_renderer_mode(RendererMode::HideCursor, true);
        }
        self.set_bracketed_paste(modes.bracketed_paste);
        self.set_mouse(modes.mouse);
        self.set_report_focus(modes.report_focus);
        self.set_kitty_flags(modes.kitty_flags);
        self.set_modify_other_keys(modes.modify_other_keys);
        self.set_grapheme_clustering(modes.grapheme_clustering);
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush(self.terminal.as_mut())
    }

    fn set_renderer_mode(&mut self, mode: RendererMode, on: bool) {
        self.renderer.set_mode(mode, on, &mut self.out);
    }

    fn set_bracketed_paste(&mut self, on: bool) {
        if self.active.bracketed_paste == on {
            return;
        }
        self.active.bracketed_paste = on;
        self.out.push(if on {
            TerminalCmd::BracketedPasteEnable
        } else {
            TerminalCmd::BracketedPasteDisable
        });
    }

    fn set_mouse(&mut self, mode: MouseMode) {
        if self.active.mouse == mode {
            return;
        }
        if self.active.mouse != MouseMode::Off {
            self.out.push(TerminalCmd::MouseDisable);
        }
        match mode {
            MouseMode::Off => {}
            MouseMode::CellMotion => self.out.push(TerminalCmd::MouseCellMotionEnable),
            MouseMode::AllMotion => self.out.push(TerminalCmd::MouseAllMotionEnable),
        }
        self.active.mouse = mode;
    }

    fn set_modify_other_keys(&mut self, level: u8) {
        if self.active.modify_other_keys == level {
            return;
        }
        self.active.modify_other_keys = level;
        self.out.push(if level == 0 {
            TerminalCmd::ModifyOtherKeysDisable
        } else {
            TerminalCmd::ModifyOtherKeysEnable(level)
        });
    }

    fn set_kitty_flags(&mut self, flags: u8) {
        if self.active.kitty_flags == flags {
            return;
        }
        // Kitty flags live on a stack; pop the previous entry before pushing.
        if self.active.kitty_flags != 0 {
            self.out.push(TerminalCmd::KittyDisable);
        }
        if flags != 0 {
            self.out.push(TerminalCmd::KittyEnable(flags));
        }
        self.active.kitty_flags = flags;
    }

    fn set_report_focus(&mut self, on: bool) {
        if self.active.report_focus == on {
            return;
        }
        self.active.report_focus = on;
        self.out.push(if on {
            TerminalCmd::FocusReportEnable
        } else {
            TerminalCmd::FocusReportDisable
        });
    }

    fn set_grapheme_clustering(&mut self, on: bool) {
        if self.active.grapheme_clustering == on {
            return;
        }
        self.active.grapheme_clustering = on;
        self.out.push(if on {
            TerminalCmd::GraphemeClusteringEnable
        } else {
            TerminalCmd::GraphemeClusteringDisable
        });
    }
}
