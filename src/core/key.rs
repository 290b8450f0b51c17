//! Key decoding.
//!
//! Turns one complete input sequence into a [`KeyMsg`] with a normalized key
//! id such as `ctrl+c`, `shift+tab`, `alt+left` or `a`. Legacy (VT/xterm),
//! xterm modified (`CSI 1;m X`, `CSI n;m ~`), modifyOtherKeys
//! (`CSI 27;m;code ~`) and kitty (`CSI code;m u`) encodings are understood.

use std::fmt;

const MOD_SHIFT: u8 = 1;
const MOD_ALT: u8 = 2;
const MOD_CTRL: u8 = 4;
const LOCK_MASK: u8 = 64 + 128;

const CODEPOINT_ESCAPE: i32 = 27;
const CODEPOINT_TAB: i32 = 9;
const CODEPOINT_ENTER: i32 = 13;
const CODEPOINT_SPACE: i32 = 32;
const CODEPOINT_BACKSPACE: i32 = 127;
const CODEPOINT_KP_ENTER: i32 = 57414;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEventType {
    #[default]
    Press,
    Repeat,
    Release,
}

/// A decoded key event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMsg {
    /// Normalized id, modifiers first in `shift+ctrl+alt` order.
    pub key: String,
    /// Printable text produced by the key, empty for non-printing keys.
    pub text: String,
    pub event_type: KeyEventType,
}

impl KeyMsg {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: String::new(),
            event_type: KeyEventType::Press,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_event_type(mut self, event_type: KeyEventType) -> Self {
        self.event_type = event_type;
        self
    }

    /// Whether this key matches `key_id` (case-insensitive).
    pub fn is(&self, key_id: &str) -> bool {
        self.key.eq_ignore_ascii_case(key_id)
    }
}

impl fmt::Display for KeyMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[derive(Debug, Clone, Copy)]
struct ModifiedKey {
    key: Named,
    modifier: u8,
    event_type: KeyEventType,
    shifted: Option<char>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Named {
    Char(char),
    Escape,
    Tab,
    Enter,
    Space,
    Backspace,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Right,
    Left,
    F(u8),
}

impl Named {
    fn name(self) -> String {
        match self {
            Named::Char(ch) => ch.to_string(),
            Named::Escape => "escape".to_string(),
            Named::Tab => "tab".to_string(),
            Named::Enter => "enter".to_string(),
            Named::Space => "space".to_string(),
            Named::Backspace => "backspace".to_string(),
            Named::Insert => "insert".to_string(),
            Named::Delete => "delete".to_string(),
            Named::Home => "home".to_string(),
            Named::End => "end".to_string(),
            Named::PageUp => "pageUp".to_string(),
            Named::PageDown => "pageDown".to_string(),
            Named::Up => "up".to_string(),
            Named::Down => "down".to_string(),
            Named::Right => "right".to_string(),
            Named::Left => "left".to_string(),
            Named::F(n) => format!("f{n}"),
        }
    }

    fn from_codepoint(codepoint: i32) -> Option<Self> {
        match codepoint {
            CODEPOINT_ESCAPE => Some(Named::Escape),
            CODEPOINT_TAB => Some(Named::Tab),
            CODEPOINT_ENTER | CODEPOINT_KP_ENTER => Some(Named::Enter),
            CODEPOINT_SPACE => Some(Named::Space),
            CODEPOINT_BACKSPACE => Some(Named::Backspace),
            cp if cp > CODEPOINT_SPACE => char::from_u32(cp as u32)
                .filter(|ch| !ch.is_control())
                .map(Named::Char),
            _ => None,
        }
    }
}

fn key_id(modifier: u8, key: Named) -> String {
    let modifier = modifier & !LOCK_MASK;
    let mut id = String::new();
    if modifier & MOD_SHIFT != 0 {
        id.push_str("shift+");
    }
    if modifier & MOD_CTRL != 0 {
        id.push_str("ctrl+");
    }
    if modifier & MOD_ALT != 0 {
        id.push_str("alt+");
    }
    id.push_str(&key.name());
    id
}

/// Decode a complete sequence. `linux_console` enables the Linux console's
/// `ESC [ [ A`..`E` function keys.
pub fn parse_key(data: &str, linux_console: bool) -> Option<KeyMsg> {
    if let Some(modified) = parse_modified_sequence(data) {
        return Some(modified_to_msg(modified));
    }

    if let Some(id) = legacy_sequence_key_id(data) {
        return Some(KeyMsg::new(id));
    }

    if linux_console {
        let id = match data {
            "\x1b[[A" => Some("f1"),
            "\x1b[[B" => Some("f2"),
            "\x1b[[C" => Some("f3"),
            "\x1b[[D" => Some("f4"),
            "\x1b[[E" => Some("f5"),
            _ => None,
        };
        if let Some(id) = id {
            return Some(KeyMsg::new(id));
        }
    }

    let id = match data {
        "\x1b" => "escape",
        "\x1c" => "ctrl+\\",
        "\x1d" => "ctrl+]",
        "\x1e" => "ctrl+^",
        "\x1f" => "ctrl+_",
        "\x1b\x1b" => "ctrl+alt+[",
        "\t" => "tab",
        "\r" | "\n" | "\x1bOM" => "enter",
        "\x00" => "ctrl+space",
        " " => return Some(KeyMsg::new("space").with_text(" ")),
        "\x7f" | "\x08" => "backspace",
        "\x1b[Z" => "shift+tab",
        "\x1b\r" => "alt+enter",
        "\x1b " => "alt+space",
        "\x1b\x7f" | "\x1b\x08" => "alt+backspace",
        _ => "",
    };
    if !id.is_empty() {
        return Some(KeyMsg::new(id));
    }

    let mut chars = data.chars();
    let first = chars.next()?;
    let second = chars.next();
    let rest = chars.next();

    match (first, second, rest) {
        ('\x1b', Some(ch), None) => {
            let code = ch as u32;
            if (1..=26).contains(&code) {
                let letter = char::from_u32(code + 96)?;
                return Some(KeyMsg::new(format!("ctrl+alt+{letter}")));
            }
            if !ch.is_control() {
                return Some(KeyMsg::new(format!("alt+{ch}")));
            }
            None
        }
        (ch, None, None) => {
            let code = ch as u32;
            if (1..=26).contains(&code) {
                let letter = char::from_u32(code + 96)?;
                return Some(KeyMsg::new(format!("ctrl+{letter}")));
            }
            if ch.is_control() {
                return None;
            }
            Some(KeyMsg::new(ch.to_string()).with_text(ch.to_string()))
        }
        _ => None,
    }
}

fn modified_to_msg(modified: ModifiedKey) -> KeyMsg {
    let modifier = modified.modifier & !LOCK_MASK;
    let printable = modifier & (MOD_CTRL | MOD_ALT) == 0;

    // Shifted printable characters are reported by the character they
    // produce, not as `shift+<base>`.
    if let (Named::Char(base), true) = (modified.key, printable) {
        let produced = if modifier & MOD_SHIFT != 0 {
            modified
                .shifted
                .unwrap_or_else(|| base.to_uppercase().next().unwrap_or(base))
        } else {
            base
        };
        return KeyMsg::new(produced.to_string())
            .with_text(produced.to_string())
            .with_event_type(modified.event_type);
    }

    let text = if modified.key == Named::Space && printable && modifier == 0 {
        " ".to_string()
    } else {
        String::new()
    };

    KeyMsg {
        key: key_id(modifier, modified.key),
        text,
        event_type: modified.event_type,
    }
}

fn parse_event_type(event_type: Option<&str>) -> KeyEventType {
    match event_type.and_then(|value| value.parse::<u8>().ok()) {
        Some(2) => KeyEventType::Repeat,
        Some(3) => KeyEventType::Release,
        _ => KeyEventType::Press,
    }
}

fn parse_modifier(part: Option<&str>) -> (u8, KeyEventType) {
    let Some(part) = part else {
        return (0, KeyEventType::Press);
    };
    let (mod_value, event_value) = match part.split_once(':') {
        Some((left, right)) => (left, Some(right)),
        None => (part, None),
    };
    let mod_value = mod_value.parse::<u8>().unwrap_or(1);
    (mod_value.saturating_sub(1), parse_event_type(event_value))
}

fn parse_modified_sequence(data: &str) -> Option<ModifiedKey> {
    let stripped = data.strip_prefix("\x1b[")?;

    // kitty: CSI code[:shifted[:base]] [; mods[:event]] u
    if let Some(body) = stripped.strip_suffix('u') {
        let (code_part, mod_part) = match body.split_once(';') {
            Some((left, right)) => (left, Some(right)),
            None => (body, None),
        };
        let mut code_iter = code_part.split(':');
        let codepoint = code_iter.next()?.parse::<i32>().ok()?;
        let shifted = code_iter
            .next()
            .and_then(|value| value.parse::<u32>().ok())
            .and_then(char::from_u32);
        let (modifier, event_type) = parse_modifier(mod_part);
        return Some(ModifiedKey {
            key: Named::from_codepoint(codepoint)?,
            modifier,
            event_type,
            shifted,
        });
    }

    if let Some(body) = stripped.strip_suffix('~') {
        let mut parts = body.split(';');
        let num_part = parts.next()?;
        let mod_part = parts.next();
        let code_part = parts.next();
        if parts.next().is_some() {
            return None;
        }

        // modifyOtherKeys: CSI 27 ; mods ; code ~
        if num_part == "27" {
            let codepoint = code_part?.parse::<i32>().ok()?;
            let (modifier, event_type) = parse_modifier(mod_part);
            return Some(ModifiedKey {
                key: Named::from_codepoint(codepoint)?,
                modifier,
                event_type,
                shifted: None,
            });
        }
        if code_part.is_some() {
            return None;
        }

        let key = match num_part.parse::<u8>().ok()? {
            1 | 7 => Named::Home,
            2 => Named::Insert,
            3 => Named::Delete,
            4 | 8 => Named::End,
            5 => Named::PageUp,
            6 => Named::PageDown,
            11 => Named::F(1),
            12 => Named::F(2),
            13 => Named::F(3),
            14 => Named::F(4),
            15 => Named::F(5),
            17 => Named::F(6),
            18 => Named::F(7),
            19 => Named::F(8),
            20 => Named::F(9),
            21 => Named::F(10),
            23 => Named::F(11),
            24 => Named::F(12),
            _ => return None,
        };
        let (modifier, event_type) = parse_modifier(mod_part);
        return Some(ModifiedKey {
            key,
            modifier,
            event_type,
            shifted: None,
        });
    }

    // xterm: CSI 1 ; mods X
    let body = stripped.strip_prefix("1;")?;
    if body.len() < 2 {
        return None;
    }
    let (mod_part, tail) = body.split_at(body.len() - 1);
    let key = match tail {
        "A" => Named::Up,
        "B" => Named::Down,
        "C" => Named::Right,
        "D" => Named::Left,
        "H" => Named::Home,
        "F" => Named::End,
        "P" => Named::F(1),
        "Q" => Named::F(2),
        "R" => Named::F(3),
        "S" => Named::F(4),
        _ => return None,
    };
    let (modifier, event_type) = parse_modifier(Some(mod_part));
    Some(ModifiedKey {
        key,
        modifier,
        event_type,
        shifted: None,
    })
}

fn legacy_sequence_key_id(data: &str) -> Option<&'static str> {
    match data {
        "\x1b[A" | "\x1bOA" => Some("up"),
        "\x1b[B" | "\x1bOB" => Some("down"),
        "\x1b[C" | "\x1bOC" => Some("right"),
        "\x1b[D" | "\x1bOD" => Some("left"),
        "\x1b[H" | "\x1bOH" => Some("home"),
        "\x1b[F" | "\x1bOF" => Some("end"),
        "\x1b[E" | "\x1bOE" => Some("clear"),
        "\x1bOe" => Some("ctrl+clear"),
        "\x1b[e" => Some("shift+clear"),
        "\x1b[2$" => Some("shift+insert"),
        "\x1b[2^" => Some("ctrl+insert"),
        "\x1b[3$" => Some("shift+delete"),
        "\x1b[3^" => Some("ctrl+delete"),
        "\x1b[[5~" => Some("pageUp"),
        "\x1b[[6~" => Some("pageDown"),
        "\x1b[a" => Some("shift+up"),
        "\x1b[b" => Some("shift+down"),
        "\x1b[c" => Some("shift+right"),
        "\x1b[d" => Some("shift+left"),
        "\x1bOa" => Some("ctrl+up"),
        "\x1bOb" => Some("ctrl+down"),
        "\x1bOc" => Some("ctrl+right"),
        "\x1bOd" => Some("ctrl+left"),
        "\x1b[5$" => Some("shift+pageUp"),
        "\x1b[6$" => Some("shift+pageDown"),
        "\x1b[7$" => Some("shift+home"),
        "\x1b[8$" => Some("shift+end"),
        "\x1b[5^" => Some("ctrl+pageUp"),
        "\x1b[6^" => Some("ctrl+pageDown"),
        "\x1b[7^" => Some("ctrl+home"),
        "\x1b[8^" => Some("ctrl+end"),
        "\x1bOP" => Some("f1"),
        "\x1bOQ" => Some("f2"),
        "\x1bOR" => Some("f3"),
        "\x1bOS" => Some("f4"),
        "\x1bb" => Some("alt+left"),
        "\x1bf" => Some("alt+right"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_key, KeyEventType, KeyMsg};

    fn id(data: &str) -> Option<String> {
        parse_key(data, false).map(|key| key.key)
    }

    #[test]
    fn control_bytes_map_to_ctrl_letters() {
        assert_eq!(id("\x03").as_deref(), Some("ctrl+c"));
        assert_eq!(id("\x1a").as_deref(), Some("ctrl+z"));
        assert_eq!(id("\r").as_deref(), Some("enter"));
        assert_eq!(id("\t").as_deref(), Some("tab"));
        assert_eq!(id("\x7f").as_deref(), Some("backspace"));
        assert_eq!(id("\x00").as_deref(), Some("ctrl+space"));
    }

    #[test]
    fn printable_characters_carry_text() {
        assert_eq!(parse_key("a", false), Some(KeyMsg::new("a").with_text("a")));
        assert_eq!(parse_key("é", false), Some(KeyMsg::new("é").with_text("é")));
        assert_eq!(
            parse_key(" ", false),
            Some(KeyMsg::new("space").with_text(" "))
        );
    }

    #[test]
    fn legacy_escape_sequences() {
        assert_eq!(id("\x1b[A").as_deref(), Some("up"));
        assert_eq!(id("\x1bOB").as_deref(), Some("down"));
        assert_eq!(id("\x1b[3~").as_deref(), Some("delete"));
        assert_eq!(id("\x1b[5~").as_deref(), Some("pageUp"));
        assert_eq!(id("\x1b[Z").as_deref(), Some("shift+tab"));
        assert_eq!(id("\x1b").as_deref(), Some("escape"));
        assert_eq!(id("\x1b[15~").as_deref(), Some("f5"));
    }

    #[test]
    fn alt_prefixed_characters() {
        assert_eq!(id("\x1bx").as_deref(), Some("alt+x"));
        assert_eq!(id("\x1b\x01").as_deref(), Some("ctrl+alt+a"));
        assert_eq!(id("\x1bb").as_deref(), Some("alt+left"));
        assert_eq!(id("\x1b\r").as_deref(), Some("alt+enter"));
    }

    #[test]
    fn xterm_modified_keys() {
        assert_eq!(id("\x1b[1;5D").as_deref(), Some("ctrl+left"));
        assert_eq!(id("\x1b[1;2A").as_deref(), Some("shift+up"));
        assert_eq!(id("\x1b[3;3~").as_deref(), Some("alt+delete"));
        assert_eq!(id("\x1b[1;6C").as_deref(), Some("shift+ctrl+right"));
    }

    #[test]
    fn modify_other_keys_sequences() {
        assert_eq!(id("\x1b[27;2;13~").as_deref(), Some("shift+enter"));
        assert_eq!(id("\x1b[27;5;105~").as_deref(), Some("ctrl+i"));
    }

    #[test]
    fn kitty_sequences_with_event_types() {
        assert_eq!(id("\x1b[97;5u").as_deref(), Some("ctrl+a"));
        assert_eq!(id("\x1b[13;2u").as_deref(), Some("shift+enter"));
        assert_eq!(id("\x1b[27u").as_deref(), Some("escape"));

        let release = parse_key("\x1b[97;1:3u", false).expect("kitty release");
        assert_eq!(release.key, "a");
        assert_eq!(release.event_type, KeyEventType::Release);

        let repeat = parse_key("\x1b[1;1:2A", false).expect("kitty repeat");
        assert_eq!(repeat.key, "up");
        assert_eq!(repeat.event_type, KeyEventType::Repeat);
    }

    #[test]
    fn kitty_shifted_letters_report_the_produced_character() {
        let key = parse_key("\x1b[97:65;2u", false).expect("shifted key");
        assert_eq!(key.key, "A");
        assert_eq!(key.text, "A");
    }

    #[test]
    fn lock_modifiers_are_ignored() {
        assert_eq!(id("\x1b[97;69u").as_deref(), Some("ctrl+a"));
    }

    #[test]
    fn linux_console_function_keys_need_the_hint() {
        assert_eq!(parse_key("\x1b[[A", false), None);
        assert_eq!(
            parse_key("\x1b[[A", true).map(|key| key.key).as_deref(),
            Some("f1")
        );
        assert_eq!(
            parse_key("\x1b[[E", true).map(|key| key.key).as_deref(),
            Some("f5")
        );
    }

    #[test]
    fn unknown_sequences_are_rejected() {
        assert_eq!(parse_key("\x1b[?1;2c", false), None);
        assert_eq!(parse_key("\x1b]11;rgb:0000/0000/0000\x07", false), None);
    }

    #[test]
    fn key_matching_is_case_insensitive() {
        assert!(KeyMsg::new("pageUp").is("pageup"));
        assert!(!KeyMsg::new("ctrl+c").is("c"));
    }
}
