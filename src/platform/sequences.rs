//! Splitting raw input bytes into classified tokens.
//!
//! Reads can end anywhere, including inside an escape sequence or a UTF-8
//! character. [`SequenceSplitter`] keeps such tails until more bytes arrive
//! or a short deadline passes, and gathers bracketed paste bodies whole.

use std::mem;
use std::time::{Duration, Instant};

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;
const PASTE_START: &[u8] = b"\x1b[200~";
const PASTE_END: &[u8] = b"\x1b[201~";

/// How long an incomplete tail may wait for the rest of its bytes.
pub(crate) const FLUSH_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EscapeKind {
    /// `ESC [ params final`.
    Csi,
    /// `ESC O x`.
    Ss3,
    /// `ESC` followed by one character.
    Alt,
    /// `ESC [ < b ; x ; y M|m`.
    SgrMouse,
    /// `ESC [ M` followed by three raw bytes.
    X10Mouse,
    /// Linux console function keys, `ESC [ [ A`.
    LinuxConsole,
    /// OSC, DCS and APC strings: replies, never keys.
    ControlString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// One character of text, control bytes included.
    Char(char),
    Escape(EscapeKind, String),
    /// Bytes that never formed a complete sequence, as they arrived.
    Partial(String),
    Paste(String),
}

enum Scan {
    Token(Token, usize),
    /// More bytes are needed.
    Incomplete,
}

pub(crate) struct SequenceSplitter {
    pending: Vec<u8>,
    /// `Some` while inside a bracketed paste.
    paste: Option<Vec<u8>>,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl SequenceSplitter {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            pending: Vec::new(),
            paste: None,
            timeout,
            deadline: None,
        }
    }

    pub(crate) fn push(&mut self, data: &[u8]) -> Vec<Token> {
        self.deadline = None;
        // A lone high byte is the meta-sends-high-bit form of alt+key.
        match data {
            [byte] if *byte > 0x7f && self.pending.is_empty() && self.paste.is_none() => {
                self.pending.extend_from_slice(&[ESC, byte - 0x80]);
            }
            _ => self.pending.extend_from_slice(data),
        }

        let mut tokens = Vec::new();
        self.drain(&mut tokens);
        if !self.pending.is_empty() && self.paste.is_none() {
            self.deadline = Some(Instant::now() + self.timeout);
        }
        tokens
    }

    /// The held tail, once its deadline has passed.
    pub(crate) fn flush_due(&mut self, now: Instant) -> Vec<Token> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.flush_partial().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Everything still held, for the end of input. An unterminated paste
    /// is delivered as it stands.
    pub(crate) fn finish(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        if let Some(body) = self.paste.take() {
            tokens.push(Token::Paste(lossy(body)));
        }
        tokens.extend(self.flush_partial());
        tokens
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
        self.paste = None;
        self.deadline = None;
    }

    fn flush_partial(&mut self) -> Option<Token> {
        self.deadline = None;
        if self.pending.is_empty() {
            return None;
        }
        Some(Token::Partial(lossy(mem::take(&mut self.pending))))
    }

    fn drain(&mut self, tokens: &mut Vec<Token>) {
        let mut pos = 0;
        loop {
            if let Some(body) = self.paste.as_mut() {
                body.extend_from_slice(&self.pending[pos..]);
                pos = self.pending.len();
                let Some(end) = find(body, PASTE_END) else {
                    break;
                };
                let rest = body.split_off(end + PASTE_END.len());
                body.truncate(end);
                if let Some(body) = self.paste.take() {
                    tokens.push(Token::Paste(lossy(body)));
                }
                self.pending = rest;
                pos = 0;
                continue;
            }

            if pos >= self.pending.len() {
                break;
            }
            if self.pending[pos..].starts_with(PASTE_START) {
                pos += PASTE_START.len();
                self.paste = Some(Vec::new());
                continue;
            }
            match scan(&self.pending[pos..]) {
                Scan::Token(token, len) => {
                    tokens.push(token);
                    pos += len;
                }
                Scan::Incomplete => break,
            }
        }
        self.pending.drain(..pos);
    }
}

fn scan(bytes: &[u8]) -> Scan {
    if bytes[0] != ESC {
        return match scan_char(bytes) {
            Some((ch, len)) => Scan::Token(Token::Char(ch), len),
            None => Scan::Incomplete,
        };
    }
    match bytes.get(1) {
        None => Scan::Incomplete,
        Some(b'[') => scan_csi(bytes),
        Some(b'O') => match bytes.get(2) {
            Some(_) => complete(bytes, EscapeKind::Ss3, 3),
            None => Scan::Incomplete,
        },
        Some(b']' | b'P' | b'_') => scan_control_string(bytes),
        Some(_) => match scan_char(&bytes[1..]) {
            Some((_, len)) => complete(bytes, EscapeKind::Alt, 1 + len),
            None => Scan::Incomplete,
        },
    }
}

/// One UTF-8 character. Invalid bytes become U+FFFD one at a time.
fn scan_char(bytes: &[u8]) -> Option<(char, usize)> {
    let width = match bytes[0] {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => return Some((char::REPLACEMENT_CHARACTER, 1)),
    };
    let Some(encoded) = bytes.get(..width) else {
        // A truncated character is only worth waiting for if it is valid so far.
        let valid_so_far = bytes[1..].iter().all(|byte| byte & 0xc0 == 0x80);
        return if valid_so_far {
            None
        } else {
            Some((char::REPLACEMENT_CHARACTER, 1))
        };
    };
    match std::str::from_utf8(encoded).ok().and_then(|s| s.chars().next()) {
        Some(ch) => Some((ch, width)),
        None => Some((char::REPLACEMENT_CHARACTER, 1)),
    }
}

fn scan_csi(bytes: &[u8]) -> Scan {
    match bytes.get(2) {
        None => return Scan::Incomplete,
        Some(b'M') => {
            return if bytes.len() >= 6 {
                complete(bytes, EscapeKind::X10Mouse, 6)
            } else {
                Scan::Incomplete
            };
        }
        _ => {}
    }

    let linux = bytes[2] == b'[';
    let start = if linux { 3 } else { 2 };
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let len = start + offset + 1;
        match byte {
            // Parameter and intermediate bytes.
            0x20..=0x3f => {}
            0x40..=0x7e => {
                let kind = if linux {
                    EscapeKind::LinuxConsole
                } else if bytes[2] == b'<' && matches!(byte, b'M' | b'm') {
                    EscapeKind::SgrMouse
                } else {
                    EscapeKind::Csi
                };
                return complete(bytes, kind, len);
            }
            // Anything else cuts the sequence short; keep it verbatim.
            _ => {
                let raw = lossy(bytes[..len - 1].to_vec());
                return Scan::Token(Token::Partial(raw), len - 1);
            }
        }
    }
    Scan::Incomplete
}

/// Ends at BEL or at the string terminator `ESC \`.
fn scan_control_string(bytes: &[u8]) -> Scan {
    let mut i = 2;
    while i < bytes.len() {
        match bytes[i] {
            BEL => return complete(bytes, EscapeKind::ControlString, i + 1),
            ESC if bytes.get(i + 1) == Some(&b'\\') => {
                return complete(bytes, EscapeKind::ControlString, i + 2)
            }
            _ => i += 1,
        }
    }
    Scan::Incomplete
}

fn complete(bytes: &[u8], kind: EscapeKind, len: usize) -> Scan {
    Scan::Token(Token::Escape(kind, lossy(bytes[..len].to_vec())), len)
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
