//! Raw bytes to messages.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::core::key::parse_key;
use crate::core::mouse::parse_mouse;
use crate::core::msg::Msg;
use crate::platform::sequences::{EscapeKind, SequenceSplitter, Token, FLUSH_TIMEOUT};

pub(crate) struct InputDecoder {
    splitter: SequenceSplitter,
    linux_console: bool,
}

impl InputDecoder {
    pub(crate) fn new(term: Option<&str>) -> Self {
        Self {
            splitter: SequenceSplitter::new(FLUSH_TIMEOUT),
            linux_console: term == Some("linux"),
        }
    }

    pub(crate) fn feed(&mut self, data: &[u8]) -> Vec<Msg> {
        let tokens = self.splitter.push(data);
        self.decode_all(tokens)
    }

    pub(crate) fn flush_due(&mut self, now: Instant) -> Vec<Msg> {
        let tokens = self.splitter.flush_due(now);
        self.decode_all(tokens)
    }

    /// Decode whatever is still held, at the end of input.
    pub(crate) fn finish(&mut self) -> Vec<Msg> {
        let tokens = self.splitter.finish();
        self.decode_all(tokens)
    }

    pub(crate) fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.splitter.next_timeout(now)
    }

    /// Drop any partial sequence, e.g. before handing the terminal back.
    pub(crate) fn reset(&mut self) {
        self.splitter.clear();
    }

    fn decode_all(&self, tokens: Vec<Token>) -> Vec<Msg> {
        tokens
            .into_iter()
            .filter_map(|token| self.decode(token))
            .collect()
    }

    fn decode(&self, token: Token) -> Option<Msg> {
        let raw = match token {
            Token::Paste(text) => return Some(Msg::Paste(text)),
            Token::Char(ch) => return self.key(ch.encode_utf8(&mut [0; 4])),
            Token::Escape(EscapeKind::SgrMouse | EscapeKind::X10Mouse, raw) => {
                return parse_mouse(&raw).map(Msg::Mouse).or_else(|| dropped(&raw));
            }
            Token::Escape(EscapeKind::ControlString, raw) => return dropped(&raw),
            Token::Escape(EscapeKind::Csi, raw) if raw == "\x1b[I" => return Some(Msg::Focus),
            Token::Escape(EscapeKind::Csi, raw) if raw == "\x1b[O" => return Some(Msg::Blur),
            Token::Escape(_, raw) | Token::Partial(raw) => raw,
        };
        self.key(&raw).or_else(|| dropped(&raw))
    }

    fn key(&self, sequence: &str) -> Option<Msg> {
        parse_key(sequence, self.linux_console).map(Msg::Key)
    }
}

fn dropped(sequence: &str) -> Option<Msg> {
    trace!(sequence = ?sequence, "dropping unrecognized input sequence");
    None
}

#[cfg(test)]
mod tests {
    use super::InputDecoder;
    use crate::core::key::KeyMsg;
    use crate::core::mouse::{MouseAction, MouseButton};
    use crate::core::msg::Msg;
    use std::time::{Duration, Instant};

    fn keys(msgs: &[Msg]) -> Vec<&str> {
        msgs.iter()
            .filter_map(|msg| match msg {
                Msg::Key(key) => Some(key.key.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn decodes_keys_focus_and_paste() {
        let mut decoder = InputDecoder::new(Some("xterm-256color"));
        let msgs = decoder.feed(b"a\x1b[A\x1b[I\x1b[200~pasted\x1b[201~\x1b[O\x03");
        assert_eq!(
            msgs,
            vec![
                Msg::Key(KeyMsg::new("a").with_text("a")),
                Msg::Key(KeyMsg::new("up")),
                Msg::Focus,
                Msg::Paste("pasted".to_string()),
                Msg::Blur,
                Msg::Key(KeyMsg::new("ctrl+c")),
            ]
        );
    }

    #[test]
    fn decodes_mouse_reports() {
        let mut decoder = InputDecoder::new(None);
        let msgs = decoder.feed(b"\x1b[<0;3;4M");
        let [Msg::Mouse(mouse)] = msgs.as_slice() else {
            panic!("expected one mouse message, got {msgs:?}");
        };
        assert_eq!((mouse.x, mouse.y), (2, 3));
        assert_eq!(mouse.button, MouseButton::Left);
        assert_eq!(mouse.action, MouseAction::Press);
    }

    #[test]
    fn lone_escape_is_emitted_after_the_flush_deadline() {
        let mut decoder = InputDecoder::new(None);
        assert!(decoder.feed(b"\x1b").is_empty());
        let wait = decoder.next_timeout(Instant::now()).expect("pending flush");
        assert!(wait <= Duration::from_millis(10));

        let msgs = decoder.flush_due(Instant::now() + Duration::from_millis(20));
        assert_eq!(keys(&msgs), vec!["escape"]);
        assert_eq!(decoder.next_timeout(Instant::now()), None);
    }

    #[test]
    fn linux_console_keys_follow_the_term_hint() {
        let mut linux = InputDecoder::new(Some("linux"));
        assert_eq!(keys(&linux.feed(b"\x1b[[B")), vec!["f2"]);

        let mut xterm = InputDecoder::new(Some("xterm"));
        assert!(xterm.feed(b"\x1b[[B").is_empty());
    }

    #[test]
    fn unknown_sequences_are_dropped() {
        let mut decoder = InputDecoder::new(None);
        let msgs = decoder.feed(b"\x1b[?62c");
        assert!(msgs.is_empty());
    }

    #[test]
    fn finish_decodes_a_trailing_escape() {
        let mut decoder = InputDecoder::new(None);
        assert_eq!(keys(&decoder.feed(b"a\x1b")), vec!["a"]);
        assert_eq!(keys(&decoder.finish()), vec!["escape"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn terminal_replies_are_not_keys() {
        let mut decoder = InputDecoder::new(None);
        assert!(decoder.feed(b"\x1b]11;rgb:ffff/ffff/ffff\x1b\\").is_empty());
        assert!(decoder.feed(b"\x1bP1$r0m\x1b\\").is_empty());
    }

    #[test]
    fn reset_discards_partial_input() {
        let mut decoder = InputDecoder::new(None);
        assert!(decoder.feed(b"\x1b[1;").is_empty());
        decoder.reset();
        assert_eq!(keys(&decoder.feed(b"x")), vec!["x"]);
    }
}
