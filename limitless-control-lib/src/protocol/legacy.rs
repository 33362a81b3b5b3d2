//! Bridge versions 1 to 5.
//!
//! Frames are two bytes, `[cmd_1, cmd_2]`, with a trailing `0x55` on
//! versions below 3. Commands that lack a second byte use `0x00`.

use bytes::{BufMut, Bytes, BytesMut};

use super::{Body, Command, LedType, Nudge, Operation, Steps};

pub const PORT: u16 = 8899;
pub const PORT_V1_V2: u16 = 50000;

pub(crate) const MAX_ZONE: u8 = 4;
const SUFFIX_BYTE: u8 = 0x00;
const LONG_FRAME_BYTE: u8 = 0x55;
const LONG_FRAME_BELOW: u8 = 3;
const BRIGHTNESS_OFFSET: u8 = 2;

/// Default UDP port for a legacy bridge version.
pub fn port(version: u8) -> u16 {
    if version < LONG_FRAME_BELOW {
        PORT_V1_V2
    } else {
        PORT
    }
}

/// How a zone is folded into the first byte of a command.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ZoneByte {
    /// One byte per zone, zones 1 to 4.
    Table([u8; 4]),
    /// Zone 1 uses the base byte, each following zone adds two.
    Offset(u8),
}

impl ZoneByte {
    fn resolve(&self, zone: u8) -> u8 {
        let index = zone.saturating_sub(1);
        match self {
            ZoneByte::Table(bytes) => bytes[usize::from(index.min(MAX_ZONE - 1))],
            ZoneByte::Offset(base) => base.wrapping_add(index * 2),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Table {
    pub(crate) steps: Steps,
    on: ZoneByte,
    off: ZoneByte,
    night_light: ZoneByte,
    white: Option<ZoneByte>,
    hue: Option<u8>,
    brightness: Option<u8>,
    nudges: &'static [(Nudge, u8)],
}

pub(crate) static WHITE: Table = Table {
    steps: Steps {
        brightness: 10,
        hue: 0,
        saturation: 0,
        temperature: 10,
    },
    on: ZoneByte::Table([0x38, 0x3D, 0x37, 0x32]),
    off: ZoneByte::Table([0x3B, 0x33, 0x3A, 0x36]),
    night_light: ZoneByte::Table([0xBB, 0xB3, 0xBA, 0xB6]),
    white: None,
    hue: None,
    brightness: None,
    nudges: &[
        (Nudge::Dimmer, 0x34),
        (Nudge::Brighter, 0x3C),
        (Nudge::Cooler, 0x3F),
        (Nudge::Warmer, 0x3E),
    ],
};

pub(crate) static RGBW: Table = Table {
    steps: Steps {
        brightness: 25,
        hue: 255,
        saturation: 0,
        temperature: 0,
    },
    on: ZoneByte::Offset(0x45),
    off: ZoneByte::Offset(0x46),
    night_light: ZoneByte::Offset(0xC6),
    white: Some(ZoneByte::Offset(0xC5)),
    hue: Some(0x40),
    brightness: Some(0x4E),
    nudges: &[],
};

impl Table {
    pub(crate) fn supports(&self, operation: Operation) -> bool {
        match operation {
            Operation::NightLight => true,
            Operation::White => self.white.is_some(),
            Operation::Hue => self.hue.is_some(),
            Operation::Brightness => self.brightness.is_some(),
            Operation::Nudge(nudge) => self.nudges.iter().any(|(n, _)| *n == nudge),
            Operation::Saturation | Operation::Temperature | Operation::Link => false,
        }
    }

    pub(crate) fn on(&self, led_type: LedType, zone: u8) -> Command {
        command(led_type, zone, self.on.resolve(zone), None)
    }

    pub(crate) fn off(&self, led_type: LedType, zone: u8) -> Command {
        command(led_type, zone, self.off.resolve(zone), None)
    }

    /// Night light only takes effect on a zone that was just switched off.
    pub(crate) fn night_light(&self, led_type: LedType, zone: u8) -> Option<Command> {
        Some(
            command(led_type, zone, self.night_light.resolve(zone), None)
                .selecting(self.off(led_type, zone)),
        )
    }

    pub(crate) fn white(&self, led_type: LedType, zone: u8) -> Option<Command> {
        let white = self.white?;
        Some(command(led_type, zone, white.resolve(zone), None).selecting(self.on(led_type, zone)))
    }

    pub(crate) fn hue(&self, led_type: LedType, zone: u8, hue: f64) -> Option<Command> {
        let opcode = self.hue?;
        Some(
            command(led_type, zone, opcode, Some(convert_hue(hue)))
                .selecting(self.on(led_type, zone)),
        )
    }

    pub(crate) fn brightness(&self, led_type: LedType, zone: u8, brightness: f64) -> Option<Command> {
        let opcode = self.brightness?;
        let value = convert_brightness(brightness, self.steps.brightness);
        Some(command(led_type, zone, opcode, Some(value)).selecting(self.on(led_type, zone)))
    }

    pub(crate) fn nudge(&self, led_type: LedType, zone: u8, nudge: Nudge) -> Option<Command> {
        let (_, opcode) = self.nudges.iter().find(|(n, _)| *n == nudge)?;
        Some(command(led_type, zone, *opcode, None).selecting(self.on(led_type, zone)))
    }
}

fn command(led_type: LedType, zone: u8, cmd_1: u8, cmd_2: Option<u8>) -> Command {
    Command::new(Body::Legacy { cmd_1, cmd_2 }, led_type, zone)
}

/// Map a decimal percentage hue onto the legacy color wheel, which starts at
/// violet and runs backwards.
pub(crate) fn convert_hue(hue: f64) -> u8 {
    let shifted = (-hue + 1.0 + 2.0 / 3.0).rem_euclid(1.0);
    (shifted * 256.0).floor() as u8
}

pub(crate) fn convert_brightness(brightness: f64, steps: u32) -> u8 {
    (brightness * f64::from(steps)).ceil() as u8 + BRIGHTNESS_OFFSET
}

pub(crate) fn encode(cmd_1: u8, cmd_2: Option<u8>, version: u8) -> Bytes {
    let mut frame = BytesMut::with_capacity(3);
    frame.put_u8(cmd_1);
    frame.put_u8(cmd_2.unwrap_or(SUFFIX_BYTE));
    if version < LONG_FRAME_BELOW {
        frame.put_u8(LONG_FRAME_BYTE);
    }
    frame.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandSet, FrameContext, SessionId};

    fn bytes(command: &Command, version: u8) -> Vec<u8> {
        command
            .to_bytes(&FrameContext {
                version,
                session_id: SessionId::default(),
                sequence: 0,
            })
            .to_vec()
    }

    #[test]
    fn test_white_on_off() {
        let set = CommandSet::new(5, LedType::White, 1).unwrap();
        assert_eq!(bytes(&set.on(), 5), vec![0x38, 0x00]);
        assert_eq!(bytes(&set.off(), 5), vec![0x3B, 0x00]);
        let set = CommandSet::new(5, LedType::White, 4).unwrap();
        assert_eq!(bytes(&set.on(), 5), vec![0x32, 0x00]);
        assert_eq!(bytes(&set.off(), 5), vec![0x36, 0x00]);
    }

    #[test]
    fn test_white_night_light() {
        let set = CommandSet::new(5, LedType::White, 2).unwrap();
        let night = set.night_light().unwrap();
        assert_eq!(bytes(&night, 5), vec![0xB3, 0x00]);
        assert_eq!(night.selection(), Some(&set.off()));
    }

    #[test]
    fn test_white_nudges() {
        let set = CommandSet::new(5, LedType::White, 1).unwrap();
        assert_eq!(bytes(&set.nudge(Nudge::Dimmer).unwrap(), 5), vec![0x34, 0x00]);
        assert_eq!(bytes(&set.nudge(Nudge::Brighter).unwrap(), 5), vec![0x3C, 0x00]);
        assert_eq!(bytes(&set.nudge(Nudge::Cooler).unwrap(), 5), vec![0x3F, 0x00]);
        assert_eq!(bytes(&set.nudge(Nudge::Warmer).unwrap(), 5), vec![0x3E, 0x00]);
        assert!(set.nudge(Nudge::RedUp).is_err());
    }

    #[test]
    fn test_rgbw_zone_offsets() {
        let set = CommandSet::new(5, LedType::Rgbw, 1).unwrap();
        assert_eq!(bytes(&set.on(), 5), vec![0x45, 0x00]);
        assert_eq!(bytes(&set.off(), 5), vec![0x46, 0x00]);
        let set = CommandSet::new(5, LedType::Rgbw, 3).unwrap();
        assert_eq!(bytes(&set.on(), 5), vec![0x49, 0x00]);
        assert_eq!(bytes(&set.off(), 5), vec![0x4A, 0x00]);
        assert_eq!(bytes(&set.white(0.5).unwrap(), 5), vec![0xC9, 0x00]);
        assert_eq!(bytes(&set.night_light().unwrap(), 5), vec![0xCA, 0x00]);
    }

    #[test]
    fn test_rgbw_hue() {
        let set = CommandSet::new(5, LedType::Rgbw, 1).unwrap();
        assert_eq!(bytes(&set.hue(0.0).unwrap(), 5), vec![0x40, 0xAA]);
        assert_eq!(bytes(&set.hue(0.5).unwrap(), 5), vec![0x40, 0x2A]);
    }

    #[test]
    fn test_rgbw_brightness() {
        let set = CommandSet::new(5, LedType::Rgbw, 1).unwrap();
        assert_eq!(bytes(&set.brightness(0.5).unwrap(), 5), vec![0x4E, 0x0F]);
        assert_eq!(bytes(&set.brightness(0.0).unwrap(), 5), vec![0x4E, 0x02]);
        assert_eq!(bytes(&set.brightness(1.0).unwrap(), 5), vec![0x4E, 0x1B]);
    }

    #[test]
    fn test_long_frames_below_v3() {
        let set = CommandSet::new(2, LedType::Rgbw, 1).unwrap();
        assert_eq!(bytes(&set.on(), 2), vec![0x45, 0x00, 0x55]);
        assert_eq!(bytes(&set.on(), 3), vec![0x45, 0x00]);
        assert_eq!(port(1), PORT_V1_V2);
        assert_eq!(port(4), PORT);
    }
}
