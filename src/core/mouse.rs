//! Mouse report decoding (SGR `CSI < b;x;y M|m` and X10 `CSI M bxy`).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    None,
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
    WheelLeft,
    WheelRight,
    Backward,
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Press,
    Release,
    Motion,
}

/// A mouse event with zero-based cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseMsg {
    pub x: u16,
    pub y: u16,
    pub button: MouseButton,
    pub action: MouseAction,
    pub shift: bool,
    pub alt: bool,
    pub ctrl: bool,
}

impl MouseMsg {
    pub fn is_wheel(&self) -> bool {
        matches!(
            self.button,
            MouseButton::WheelUp
                | MouseButton::WheelDown
                | MouseButton::WheelLeft
                | MouseButton::WheelRight
        )
    }
}

const BIT_SHIFT: u32 = 0b0000_0100;
const BIT_ALT: u32 = 0b0000_1000;
const BIT_CTRL: u32 = 0b0001_0000;
const BIT_MOTION: u32 = 0b0010_0000;
const BIT_WHEEL: u32 = 0b0100_0000;
const BIT_ADDITIONAL: u32 = 0b1000_0000;
const BUTTON_MASK: u32 = 0b0000_0011;

/// Decode a complete mouse report, or `None` when `data` is not one.
pub fn parse_mouse(data: &str) -> Option<MouseMsg> {
    if let Some(body) = data.strip_prefix("\x1b[<") {
        return parse_sgr(body);
    }
    if let Some(body) = data.strip_prefix("\x1b[M") {
        return parse_x10(body);
    }
    None
}

fn parse_sgr(body: &str) -> Option<MouseMsg> {
    let (params, release) = if let Some(params) = body.strip_suffix('M') {
        (params, false)
    } else {
        (body.strip_suffix('m')?, true)
    };
    let mut parts = params.split(';');
    let code = parts.next()?.parse::<u32>().ok()?;
    let x = parts.next()?.parse::<u16>().ok()?;
    let y = parts.next()?.parse::<u16>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(decode(code, x.saturating_sub(1), y.saturating_sub(1), release))
}

fn parse_x10(body: &str) -> Option<MouseMsg> {
    let mut chars = body.chars();
    let code = chars.next()? as u32;
    let x = chars.next()? as u32;
    let y = chars.next()? as u32;
    if chars.next().is_some() {
        return None;
    }
    let code = code.checked_sub(32)?;
    // Coordinates are offset by 32 and are one-based.
    let x = u16::try_from(x.checked_sub(33)?).ok()?;
    let y = u16::try_from(y.checked_sub(33)?).ok()?;
    // X10 has no release bit; button 3 means "released".
    let release = code & (BIT_WHEEL | BIT_ADDITIONAL | BUTTON_MASK) == 3;
    Some(decode(code, x, y, release))
}

fn decode(code: u32, x: u16, y: u16, release: bool) -> MouseMsg {
    let low = code & BUTTON_MASK;
    let button = if code & BIT_ADDITIONAL != 0 {
        match low {
            0 => MouseButton::Backward,
            1 => MouseButton::Forward,
            _ => MouseButton::None,
        }
    } else if code & BIT_WHEEL != 0 {
        match low {
            0 => MouseButton::WheelUp,
            1 => MouseButton::WheelDown,
            2 => MouseButton::WheelLeft,
            _ => MouseButton::WheelRight,
        }
    } else {
        match low {
            0 => MouseButton::Left,
            1 => MouseButton::Middle,
            2 => MouseButton::Right,
            _ => MouseButton::None,
        }
    };

    let action = if code & BIT_MOTION != 0 && code & BIT_WHEEL == 0 {
        MouseAction::Motion
    } else if release {
        MouseAction::Release
    } else {
        MouseAction::Press
    };

    // A release in X10 mode cannot say which button went up.
    let button = if release && !matches!(action, MouseAction::Motion) && low == 3 {
        MouseButton::None
    } else {
        button
    };

    MouseMsg {
        x,
        y,
        button,
        action,
        shift: code & BIT_SHIFT != 0,
        alt: code & BIT_ALT != 0,
        ctrl: code & BIT_CTRL != 0,
    }
}
