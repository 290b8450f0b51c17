//! The renderer seam.
//!
//! The terminal controller hands views and cursor/alt-screen requests to a
//! [`Renderer`]; how a view becomes terminal writes is the renderer's
//! business.

use crate::core::output::{OutputGate, TerminalCmd};

const SYNC_START: &str = "\x1b[?2026h";
const SYNC_END: &str = "\x1b[?2026l";

/// Display modes owned by the renderer rather than the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererMode {
    AltScreen,
    HideCursor,
}

pub trait Renderer: Send {
    fn mode(&self, mode: RendererMode) -> bool;

    /// Switch `mode` on or off, queueing whatever output that takes.
    fn set_mode(&mut self, mode: RendererMode, on: bool, out: &mut OutputGate);

    fn render(&mut self, view: &str, out: &mut OutputGate);

    fn resize(&mut self, width: u16, height: u16);

    /// Forget what is on screen so the next render repaints everything.
    fn invalidate(&mut self);
}

/// Repaints the whole view, in place, whenever it changes.
#[derive(Debug, Default)]
pub struct LineRenderer {
    last_view: Option<String>,
    lines_rendered: usize,
    alt_screen: bool,
    hide_cursor: bool,
    width: u16,
    height: u16,
}

impl LineRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }
}

impl Renderer for LineRenderer {
    fn mode(&self, mode: RendererMode) -> bool {
        match mode {
            RendererMode::AltScreen => self.alt_screen,
            RendererMode::HideCursor => self.hide_cursor,
        }
    }

    fn set_mode(&mut self, mode: RendererMode, on: bool, out: &mut OutputGate) {
        match mode {
            RendererMode::AltScreen => {
                if self.alt_screen == on {
                    return;
                }
                self.alt_screen = on;
                if on {
                    out.extend([TerminalCmd::EnterAltScreen, TerminalCmd::ClearScreen]);
                } else {
                    out.push(TerminalCmd::ExitAltScreen);
                }
                // The other screen holds none of our lines.
                self.lines_rendered = 0;
                self.invalidate();
            }
            RendererMode::HideCursor => {
                if self.hide_cursor == on {
                    return;
                }
                self.hide_cursor = on;
                out.push(if on {
                    TerminalCmd::HideCursor
                } else {
                    TerminalCmd::ShowCursor
                });
            }
        }
    }

    fn render(&mut self, view: &str, out: &mut OutputGate) {
        if self.last_view.as_deref() == Some(view) {
            return;
        }

        let up = self.lines_rendered.saturating_sub(1).min(u16::MAX as usize) as u16;
        out.extend([
            TerminalCmd::bytes(SYNC_START),
            TerminalCmd::CursorUpStart(up),
            TerminalCmd::EraseBelow,
        ]);

        let mut buffer = String::new();
        let mut lines = 0;
        for (i, line) in view.split('\n').enumerate() {
            if i > 0 {
                buffer.push_str("\r\n");
            }
            buffer.push_str(line.strip_suffix('\r').unwrap_or(line));
            lines += 1;
        }
        buffer.push_str(SYNC_END);
        out.push(TerminalCmd::Bytes(buffer));

        self.lines_rendered = lines;
        self.last_view = Some(view.to_string());
    }

    fn resize(&mut self, width: u16, height: u16) {
        if (self.width, self.height) != (width, height) {
            self.width = width;
            self.height = height;
            self.invalidate();
        }
    }

    fn invalidate(&mut self) {
        self.last_view = None;
    }
}

/// Renders nothing; only tracks modes. For headless programs.
#[derive(Debug, Default)]
pub struct NullRenderer {
    alt_screen: bool,
    hide_cursor: bool,
}

impl Renderer for NullRenderer {
    fn mode(&self, mode: RendererMode) -> bool {
        match mode {
            RendererMode::AltScreen => self.alt_screen,
            RendererMode::HideCursor => self.hide_cursor,
        }
    }

    fn set_mode(&mut self, mode: RendererMode, on: bool, _out: &mut OutputGate) {
        match mode {
            RendererMode::AltScreen => self.alt_screen = on,
            RendererMode::HideCursor => self.hide_cursor = on,
        }
    }

    fn render(&mut self, _view: &str, _out: &mut OutputGate) {}

    fn resize(&mut self, _width: u16, _height: u16) {}

    fn invalidate(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::{LineRenderer, NullRenderer, Renderer, RendererMode};
    use crate::core::output::OutputGate;
    use crate::core::terminal::testing::RecordingTerminal;
    use pretty_assertions::assert_eq;

    fn flush(gate: &mut OutputGate) -> String {
        let mut term = RecordingTerminal::default();
        gate.flush(&mut term).expect("flush");
        term.output()
    }

    #[test]
    fn first_render_paints_lines_with_crlf() {
        let mut renderer = LineRenderer::new();
        let mut gate = OutputGate::new();
        renderer.render("one\ntwo", &mut gate);
        assert_eq!(
            flush(&mut gate),
            "\x1b[?2026h\r\x1b[Jone\r\ntwo\x1b[?2026l"
        );
    }

    #[test]
    fn repaint_moves_back_over_previous_lines() {
        let mut renderer = LineRenderer::new();
        let mut gate = OutputGate::new();
        renderer.render("a\nb\nc", &mut gate);
        gate.clear();

        renderer.render("d", &mut gate);
        assert_eq!(flush(&mut gate), "\x1b[?2026h\r\x1b[2A\x1b[Jd\x1b[?2026l");
    }

    #[test]
    fn identical_view_writes_nothing_until_invalidated() {
        let mut renderer = LineRenderer::new();
        let mut gate = OutputGate::new();
        renderer.render("same", &mut gate);
        gate.clear();

        renderer.render("same", &mut gate);
        assert!(gate.is_empty());

        renderer.resize(80, 24);
        renderer.render("same", &mut gate);
        assert!(!gate.is_empty());
    }

    #[test]
    fn modes_toggle_once() {
        let mut renderer = LineRenderer::new();
        let mut gate = OutputGate::new();

        renderer.set_mode(RendererMode::HideCursor, true, &mut gate);
        renderer.set_mode(RendererMode::HideCursor, true, &mut gate);
        renderer.set_mode(RendererMode::AltScreen, true, &mut gate);
        assert!(renderer.mode(RendererMode::HideCursor));
        assert!(renderer.mode(RendererMode::AltScreen));
        assert_eq!(flush(&mut gate), "\x1b[?25l\x1b[?1049h\x1b[2J\x1b[H");

        renderer.set_mode(RendererMode::AltScreen, false, &mut gate);
        renderer.set_mode(RendererMode::HideCursor, false, &mut gate);
        assert_eq!(flush(&mut gate), "\x1b[?1049l\x1b[?25h");
    }

    #[test]
    fn null_renderer_tracks_modes_silently() {
        let mut renderer = NullRenderer::default();
        let mut gate = OutputGate::new();
        renderer.set_mode(RendererMode::AltScreen, true, &mut gate);
        renderer.render("ignored", &mut gate);
        assert!(renderer.mode(RendererMode::AltScreen));
        assert!(gate.is_empty());
    }
}
