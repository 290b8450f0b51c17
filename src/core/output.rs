//! Typed terminal output commands and a single output gate.
//!
//! Invariant: all terminal writes must flow through `OutputGate::flush(..)`.

use std::io;

use crate::core::terminal::Terminal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCmd {
    /// Raw bytes/control sequences (UTF-8 string) to be written to the terminal.
    Bytes(String),

    HideCursor,
    ShowCursor,
    EnterAltScreen,
    ExitAltScreen,
    ClearScreen,
    /// Move the cursor up `n` rows and to column one.
    CursorUpStart(u16),
    EraseBelow,

    BracketedPasteEnable,
    BracketedPasteDisable,
    MouseCellMotionEnable,
    MouseAllMotionEnable,
    MouseDisable,
    ModifyOtherKeysEnable(u8),
    ModifyOtherKeysDisable,
    KittyEnable(u8),
    KittyDisable,
    FocusReportEnable,
    FocusReportDisable,
    GraphemeClusteringEnable,
    GraphemeClusteringDisable,
    SetTitle(String),
}

impl TerminalCmd {
    pub fn bytes(data: impl Into<String>) -> Self {
        Self::Bytes(data.into())
    }

    /// Append the wire encoding of this command to `out`.
    pub fn encode(&self, out: &mut String) {
        match self {
            TerminalCmd::Bytes(data) => out.push_str(data),
            TerminalCmd::HideCursor => out.push_str("\x1b[?25l"),
            TerminalCmd::ShowCursor => out.push_str("\x1b[?25h"),
            TerminalCmd::EnterAltScreen => out.push_str("\x1b[?1049h"),
            TerminalCmd::ExitAltScreen => out.push_str("\x1b[?1049l"),
            TerminalCmd::ClearScreen => out.push_str("\x1b[2J\x1b[H"),
            TerminalCmd::CursorUpStart(0) => out.push('\r'),
            TerminalCmd::CursorUpStart(n) => {
                out.push('\r');
                out.push_str(&format!("\x1b[{n}A"));
            }
            TerminalCmd::EraseBelow => out.push_str("\x1b[J"),
            TerminalCmd::BracketedPasteEnable => out.push_str("\x1b[?2004h"),
            TerminalCmd::BracketedPasteDisable => out.push_str("\x1b[?2004l"),
            TerminalCmd::MouseCellMotionEnable => out.push_str("\x1b[?1002h\x1b[?1006h"),
            TerminalCmd::MouseAllMotionEnable => out.push_str("\x1b[?1003h\x1b[?1006h"),
            TerminalCmd::MouseDisable => {
                out.push_str("\x1b[?1002l\x1b[?1003l\x1b[?1006l");
            }
            TerminalCmd::ModifyOtherKeysEnable(level) => {
                out.push_str(&format!("\x1b[>4;{level}m"));
            }
            TerminalCmd::ModifyOtherKeysDisable => out.push_str("\x1b[>4;0m"),
            TerminalCmd::KittyEnable(flags) => out.push_str(&format!("\x1b[>{flags}u")),
            TerminalCmd::KittyDisable => out.push_str("\x1b[<u"),
            TerminalCmd::FocusReportEnable => out.push_str("\x1b[?1004h"),
            TerminalCmd::FocusReportDisable => out.push_str("\x1b[?1004l"),
            TerminalCmd::GraphemeClusteringEnable => out.push_str("\x1b[?2027h"),
            TerminalCmd::GraphemeClusteringDisable => out.push_str("\x1b[?2027l"),
            TerminalCmd::SetTitle(title) => {
                out.push_str("\x1b]2;");
                out.push_str(title);
                out.push('\x07');
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct OutputGate {
    cmds: Vec<TerminalCmd>,
}

impl OutputGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: TerminalCmd) {
        self.cmds.push(cmd);
    }

    pub fn extend<I>(&mut self, cmds: I)
    where
        I: IntoIterator<Item = TerminalCmd>,
    {
        self.cmds.extend(cmds);
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    pub fn clear(&mut self) {
        self.cmds.clear();
    }

    /// Flush buffered commands to the terminal as one write.
    ///
    /// This is the single write gate: `Terminal::write(..)` must not be called
    /// from anywhere else.
    pub fn flush<T: Terminal + ?Sized>(&mut self, term: &mut T) -> io::Result<()> {
        if self.cmds.is_empty() {
            return Ok(());
        }
        let mut out = String::new();
        for cmd in self.cmds.drain(..) {
            cmd.encode(&mut out);
        }
        term.write(&out)
    }
}
