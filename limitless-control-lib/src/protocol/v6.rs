//! Bridge version 6 ("iBox").
//!
//! Every command frame carries the two session bytes handed out by the
//! handshake, a wrapping sequence number and a trailing checksum:
//!
//! ```text
//! 80 00 00 00 11 wb1 wb2 00 seq 00 | type 00 00 style cmd1 cmd2 cmd2 cmd2 cmd2 | zone 00 | sum
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::{Body, Command, FrameContext, LedType, Nudge, Operation, SessionId, Steps};

pub const PORT: u16 = 5987;

pub const TYPE_CONTROL: u8 = 0x31;
pub const TYPE_LINK: u8 = 0x3D;
pub const TYPE_UNLINK: u8 = 0x3E;

const PASSWORD_BYTE_1: u8 = 0x00;
const PASSWORD_BYTE_2: u8 = 0x00;

const MAX_HUE: i32 = 0xFF;
const MAX_SATURATION: f64 = 100.0;
const MAX_BRIGHTNESS: f64 = 100.0;
const MAX_TEMPERATURE: f64 = 100.0;

pub(crate) const STEPS: Steps = Steps {
    brightness: 101,
    hue: 256,
    saturation: 101,
    temperature: 101,
};

const COMMAND_PREAMBLE: [u8; 5] = [0x80, 0x00, 0x00, 0x00, 0x11];
pub const FRAME_LEN: usize = 22;

/// Opens a session. The bridge answers with [`SESSION_RESPONSE_LEN`] bytes.
pub const SESSION_REQUEST: [u8; 27] = [
    0x20, 0x00, 0x00, 0x00, 0x16, 0x02, 0x62, 0x3A, 0xD5, 0xED, 0xA3, 0x01, 0xAE, 0x08, 0x2D, 0x46,
    0x61, 0x41, 0xA7, 0xF6, 0xDC, 0xAF, 0xD3, 0xE6, 0x00, 0x00, 0x1E,
];
pub const SESSION_RESPONSE_LEN: usize = 22;
const SESSION_RESPONSE_MARKER: u8 = 0x28;
const SESSION_ID_OFFSETS: (usize, usize) = (19, 20);

const KEEP_ALIVE_PREAMBLE: [u8; 5] = [0xD0, 0x00, 0x00, 0x00, 0x02];
const KEEP_ALIVE_RESPONSE_PREAMBLE: [u8; 5] = [0xD8, 0x00, 0x00, 0x00, 0x07];

/// Extract the session bytes from a handshake response.
pub fn parse_session_response(data: &[u8]) -> Option<SessionId> {
    if data.len() < SESSION_RESPONSE_LEN || data[0] != SESSION_RESPONSE_MARKER {
        return None;
    }
    Some(SessionId(
        data[SESSION_ID_OFFSETS.0],
        data[SESSION_ID_OFFSETS.1],
    ))
}

pub fn keep_alive_frame(session_id: SessionId) -> Bytes {
    let mut frame = BytesMut::with_capacity(KEEP_ALIVE_PREAMBLE.len() + 2);
    frame.put_slice(&KEEP_ALIVE_PREAMBLE);
    frame.put_u8(session_id.0);
    frame.put_u8(session_id.1);
    frame.freeze()
}

pub fn is_keep_alive_response(data: &[u8]) -> bool {
    data.starts_with(&KEEP_ALIVE_RESPONSE_PREAMBLE)
}

/// Low byte of the sum of all bytes.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

pub(crate) fn encode(
    command_type: u8,
    remote_style: u8,
    cmd_1: u8,
    cmd_2: u8,
    zone: u8,
    ctx: &FrameContext,
) -> Bytes {
    let mut frame = BytesMut::with_capacity(FRAME_LEN);
    frame.put_slice(&COMMAND_PREAMBLE);
    frame.put_u8(ctx.session_id.0);
    frame.put_u8(ctx.session_id.1);
    frame.put_u8(0x00);
    frame.put_u8(ctx.sequence);
    frame.put_u8(0x00);

    let body_start = frame.len();
    frame.put_u8(command_type);
    frame.put_u8(PASSWORD_BYTE_1);
    frame.put_u8(PASSWORD_BYTE_2);
    frame.put_u8(remote_style);
    frame.put_u8(cmd_1);
    for _ in 0..4 {
        frame.put_u8(cmd_2);
    }
    frame.put_u8(zone);
    frame.put_u8(0x00);

    let sum = checksum(&frame[body_start..]);
    frame.put_u8(sum);
    frame.freeze()
}

type Pair = (u8, u8);

#[derive(Debug, Clone, Copy)]
enum HueWheel {
    /// The older wheel shared with legacy RGBW bulbs.
    Legacy,
    /// Newer bulbs, offset by ten.
    Shifted,
}

#[derive(Debug, Clone, Copy)]
enum WhiteMode {
    Unsupported,
    Command(Pair),
    /// White is a color temperature on this family.
    Temperature,
}

#[derive(Debug)]
pub(crate) struct Table {
    remote_style: u8,
    pub(crate) max_zone: u8,
    on: Pair,
    off: Pair,
    night_light: Option<Pair>,
    white: WhiteMode,
    hue: Option<(u8, HueWheel)>,
    saturation: Option<u8>,
    brightness: Option<u8>,
    temperature: Option<u8>,
    nudges: &'static [(Nudge, Pair)],
    pairing: bool,
}

pub(crate) static BRIDGE_LED: Table = Table {
    remote_style: 0x00,
    max_zone: 1,
    on: (0x03, 0x03),
    off: (0x03, 0x04),
    night_light: None,
    white: WhiteMode::Command((0x03, 0x05)),
    hue: Some((0x01, HueWheel::Shifted)),
    saturation: None,
    brightness: Some(0x02),
    temperature: None,
    nudges: &[],
    pairing: false,
};

pub(crate) static WHITE: Table = Table {
    remote_style: 0x01,
    max_zone: 4,
    on: (0x01, 0x07),
    off: (0x01, 0x08),
    night_light: Some((0x01, 0x06)),
    white: WhiteMode::Unsupported,
    hue: None,
    saturation: None,
    brightness: None,
    temperature: None,
    nudges: &[
        (Nudge::Dimmer, (0x01, 0x02)),
        (Nudge::Brighter, (0x01, 0x01)),
        (Nudge::Cooler, (0x01, 0x04)),
        (Nudge::Warmer, (0x01, 0x03)),
    ],
    pairing: true,
};

pub(crate) static DIMMER: Table = Table {
    remote_style: 0x03,
    max_zone: 4,
    on: (0x04, 0x03),
    off: (0x04, 0x04),
    night_light: Some((0x04, 0x02)),
    white: WhiteMode::Unsupported,
    hue: None,
    saturation: None,
    brightness: Some(0x01),
    temperature: None,
    nudges: &[],
    pairing: true,
};

pub(crate) static RGBW: Table = Table {
    remote_style: 0x07,
    max_zone: 4,
    on: (0x03, 0x01),
    off: (0x03, 0x02),
    night_light: Some((0x03, 0x06)),
    white: WhiteMode::Command((0x03, 0x05)),
    hue: Some((0x01, HueWheel::Legacy)),
    saturation: None,
    brightness: Some(0x02),
    temperature: None,
    nudges: &[],
    pairing: true,
};

pub(crate) static WRGB: Table = Table {
    remote_style: 0x06,
    max_zone: 4,
    on: (0x03, 0x01),
    off: (0x03, 0x02),
    night_light: Some((0x03, 0x06)),
    white: WhiteMode::Command((0x03, 0x05)),
    hue: Some((0x01, HueWheel::Legacy)),
    saturation: None,
    brightness: Some(0x02),
    temperature: None,
    nudges: &[
        (Nudge::WhiteUp, (0x03, 0x03)),
        (Nudge::WhiteDown, (0x03, 0x04)),
        (Nudge::RedUp, (0x03, 0x05)),
        (Nudge::RedDown, (0x03, 0x06)),
        (Nudge::GreenUp, (0x03, 0x07)),
        (Nudge::GreenDown, (0x03, 0x08)),
        (Nudge::BlueUp, (0x03, 0x09)),
        (Nudge::BlueDown, (0x03, 0x0A)),
    ],
    pairing: true,
};

pub(crate) static RGBWW: Table = Table {
    remote_style: 0x08,
    max_zone: 4,
    on: (0x04, 0x01),
    off: (0x04, 0x02),
    night_light: Some((0x04, 0x05)),
    white: WhiteMode::Temperature,
    hue: Some((0x01, HueWheel::Shifted)),
    saturation: Some(0x02),
    brightness: Some(0x03),
    temperature: Some(0x05),
    nudges: &[],
    pairing: true,
};

pub(crate) static RGBCCT: Table = Table {
    remote_style: 0x0A,
    max_zone: 8,
    on: (0x06, 0x01),
    off: (0x06, 0x02),
    night_light: Some((0x06, 0x64)),
    white: WhiteMode::Command((0x06, 0x05)),
    hue: Some((0x01, HueWheel::Shifted)),
    saturation: Some(0x03),
    brightness: Some(0x04),
    temperature: Some(0x02),
    nudges: &[],
    pairing: true,
};

impl Table {
    pub(crate) fn supports(&self, operation: Operation) -> bool {
        match operation {
            Operation::NightLight => self.night_light.is_some(),
            Operation::White => !matches!(self.white, WhiteMode::Unsupported),
            Operation::Hue => self.hue.is_some(),
            Operation::Saturation => self.saturation.is_some(),
            Operation::Brightness => self.brightness.is_some(),
            Operation::Temperature => self.temperature.is_some(),
            Operation::Nudge(nudge) => self.nudges.iter().any(|(n, _)| *n == nudge),
            Operation::Link => self.pairing,
        }
    }

    fn command(&self, led_type: LedType, zone: u8, command_type: u8, pair: Pair) -> Command {
        Command::new(
            Body::V6 {
                command_type,
                remote_style: self.remote_style,
                cmd_1: pair.0,
                cmd_2: pair.1,
            },
            led_type,
            zone,
        )
    }

    fn control(&self, led_type: LedType, zone: u8, pair: Pair) -> Command {
        self.command(led_type, zone, TYPE_CONTROL, pair)
    }

    pub(crate) fn on(&self, led_type: LedType, zone: u8) -> Command {
        self.control(led_type, zone, self.on)
    }

    pub(crate) fn off(&self, led_type: LedType, zone: u8) -> Command {
        self.control(led_type, zone, self.off)
    }

    pub(crate) fn night_light(&self, led_type: LedType, zone: u8) -> Option<Command> {
        Some(self.control(led_type, zone, self.night_light?))
    }

    pub(crate) fn white(&self, led_type: LedType, zone: u8, temperature: f64) -> Option<Command> {
        match self.white {
            WhiteMode::Unsupported => None,
            WhiteMode::Command(pair) => Some(self.control(led_type, zone, pair)),
            WhiteMode::Temperature => self.temperature(led_type, zone, temperature),
        }
    }

    pub(crate) fn hue(&self, led_type: LedType, zone: u8, hue: f64) -> Option<Command> {
        let (opcode, wheel) = self.hue?;
        Some(self.control(led_type, zone, (opcode, convert_hue(hue, wheel))))
    }

    pub(crate) fn saturation(&self, led_type: LedType, zone: u8, saturation: f64) -> Option<Command> {
        let opcode = self.saturation?;
        Some(self.control(led_type, zone, (opcode, convert_saturation(saturation))))
    }

    pub(crate) fn brightness(&self, led_type: LedType, zone: u8, brightness: f64) -> Option<Command> {
        let opcode = self.brightness?;
        let value = scale(brightness, MAX_BRIGHTNESS);
        Some(self.control(led_type, zone, (opcode, value)))
    }

    pub(crate) fn temperature(&self, led_type: LedType, zone: u8, temperature: f64) -> Option<Command> {
        let opcode = self.temperature?;
        let value = scale(temperature, MAX_TEMPERATURE);
        Some(self.control(led_type, zone, (opcode, value)))
    }

    pub(crate) fn nudge(&self, led_type: LedType, zone: u8, nudge: Nudge) -> Option<Command> {
        let (_, pair) = self.nudges.iter().find(|(n, _)| *n == nudge)?;
        let command = self.control(led_type, zone, *pair);
        if nudge.requires_selection() {
            Some(command.selecting(self.on(led_type, zone)))
        } else {
            Some(command)
        }
    }

    pub(crate) fn pairing(&self, led_type: LedType, zone: u8, command_type: u8) -> Option<Command> {
        if !self.pairing {
            return None;
        }
        Some(self.command(led_type, zone, command_type, (0x00, 0x00)))
    }
}

fn scale(value: f64, max: f64) -> u8 {
    (value * max).ceil() as u8
}

/// Saturation is sent inverted: 0 means full color, 100 means white.
fn convert_saturation(saturation: f64) -> u8 {
    scale(1.0 - saturation, MAX_SATURATION)
}

fn convert_hue(hue: f64, wheel: HueWheel) -> u8 {
    let mut hue = (hue * f64::from(MAX_HUE)).ceil() as i32;
    match wheel {
        HueWheel::Legacy => {
            hue = (176 - hue).rem_euclid(MAX_HUE + 1);
            hue = (MAX_HUE - hue - 0x37).rem_euclid(MAX_HUE + 1);
        }
        HueWheel::Shifted => hue += 10,
    }
    hue.rem_euclid(MAX_HUE + 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CommandSet;

    const CTX: FrameContext = FrameContext {
        version: 6,
        session_id: SessionId(0xAB, 0xCD),
        sequence: 7,
    };

    #[test]
    fn test_rgbw_on_frame() {
        let set = CommandSet::new(6, LedType::Rgbw, 2).unwrap();
        let frame = set.on().to_bytes(&CTX);
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(
            &frame[..],
            &[
                0x80, 0x00, 0x00, 0x00, 0x11, 0xAB, 0xCD, 0x00, 0x07, 0x00, 0x31, 0x00, 0x00, 0x07,
                0x03, 0x01, 0x01, 0x01, 0x01, 0x02, 0x00, 0x41
            ]
        );
    }

    #[test]
    fn test_checksum_covers_body_and_zone() {
        let set = CommandSet::new(6, LedType::Rgbcct, 8).unwrap();
        let frame = set.brightness(1.0).unwrap().to_bytes(&CTX);
        assert_eq!(frame[frame.len() - 1], checksum(&frame[10..21]));
        assert_eq!(frame[19], 8);
        assert_eq!(frame[14], 0x04);
        assert_eq!(frame[15], 100);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum(&[]), 0x00);
    }

    #[test]
    fn test_link_frames() {
        let set = CommandSet::new(6, LedType::Rgbww, 1).unwrap();
        let link = set.link().unwrap().to_bytes(&CTX);
        assert_eq!(link[10], TYPE_LINK);
        assert_eq!(&link[14..19], &[0, 0, 0, 0, 0]);
        let unlink = set.unlink().unwrap().to_bytes(&CTX);
        assert_eq!(unlink[10], TYPE_UNLINK);
        let bridge = CommandSet::new(6, LedType::BridgeLed, 1).unwrap();
        assert!(bridge.link().is_err());
    }

    #[test]
    fn test_hue_wheels() {
        assert_eq!(convert_hue(0.0, HueWheel::Shifted), 10);
        assert_eq!(convert_hue(1.0, HueWheel::Shifted), 9);
        // 176 then 255 - 176 - 55
        assert_eq!(convert_hue(0.0, HueWheel::Legacy), 24);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(scale(0.5, MAX_BRIGHTNESS), 50);
        assert_eq!(scale(0.001, MAX_BRIGHTNESS), 1);
        assert_eq!(convert_saturation(1.0), 0);
        assert_eq!(convert_saturation(0.0), 100);
    }

    #[test]
    fn test_rgbww_white_is_temperature() {
        let set = CommandSet::new(6, LedType::Rgbww, 1).unwrap();
        assert_eq!(set.white(0.3).unwrap(), set.temperature(0.3).unwrap());
    }

    #[test]
    fn test_nudge_selection() {
        let white = CommandSet::new(6, LedType::White, 1).unwrap();
        assert!(white.nudge(Nudge::Brighter).unwrap().requires_selection());
        let wrgb = CommandSet::new(6, LedType::Wrgb, 1).unwrap();
        assert!(!wrgb.nudge(Nudge::RedUp).unwrap().requires_selection());
        assert!(wrgb.nudge(Nudge::Brighter).is_err());
    }

    #[test]
    fn test_session_response() {
        let mut response = [0u8; SESSION_RESPONSE_LEN];
        response[0] = 0x28;
        response[19] = 0x12;
        response[20] = 0x34;
        assert_eq!(
            parse_session_response(&response),
            Some(SessionId(0x12, 0x34))
        );
        response[0] = 0x27;
        assert_eq!(parse_session_response(&response), None);
        assert_eq!(parse_session_response(&[0x28; 5]), None);
    }

    #[test]
    fn test_keep_alive() {
        assert_eq!(
            &keep_alive_frame(SessionId(1, 2))[..],
            &[0xD0, 0x00, 0x00, 0x00, 0x02, 0x01, 0x02]
        );
        assert!(is_keep_alive_response(&[0xD8, 0, 0, 0, 0x07, 1, 2, 3]));
        assert!(!is_keep_alive_response(&[0xD8, 0, 0]));
    }
}
