//! Wire codec for the LimitlessLED bridge generations.
//!
//! A [`CommandSet`] is selected from a capability table keyed by the bridge
//! version and the [`LedType`] of a group. It maps semantic operations (on,
//! brightness, hue, ...) to immutable [`Command`] values. A command only
//! becomes bytes when the serializer encodes it against the bridge's current
//! [`FrameContext`]; nothing in here performs I/O or holds state.

pub mod legacy;
pub mod v6;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{check_unit, Error, Result};

/// Device families a bridge can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedType {
    /// The lamp built into a v6 bridge.
    BridgeLed,
    /// Dimmable white bulbs with adjustable temperature, stepped control only.
    White,
    /// Single channel dimmer controller.
    Dimmer,
    Rgbw,
    Rgbww,
    Wrgb,
    Rgbcct,
}

impl FromStr for LedType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bridge_led" | "bridge-led" => Ok(LedType::BridgeLed),
            "white" => Ok(LedType::White),
            "dimmer" => Ok(LedType::Dimmer),
            "rgbw" => Ok(LedType::Rgbw),
            "rgbww" => Ok(LedType::Rgbww),
            "wrgb" => Ok(LedType::Wrgb),
            "rgbcct" => Ok(LedType::Rgbcct),
            _ => Err(Error::InvalidArgument(format!("unknown LED type: {s}"))),
        }
    }
}

impl fmt::Display for LedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LedType::BridgeLed => "bridge_led",
            LedType::White => "white",
            LedType::Dimmer => "dimmer",
            LedType::Rgbw => "rgbw",
            LedType::Rgbww => "rgbww",
            LedType::Wrgb => "wrgb",
            LedType::Rgbcct => "rgbcct",
        };
        write!(f, "{}", name)
    }
}

/// Protocol family spoken by a bridge version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// Versions 1 to 5: bare two or three byte frames, no session.
    Legacy,
    /// Version 6: session handshake, keep-alive and checksummed frames.
    V6,
}

impl Generation {
    pub fn of(version: u8) -> Result<Self> {
        match version {
            1..=5 => Ok(Generation::Legacy),
            6 => Ok(Generation::V6),
            _ => Err(Error::UnsupportedVersion(version)),
        }
    }

    pub fn has_session(&self) -> bool {
        matches!(self, Generation::V6)
    }
}

/// Quantization granularity of each controllable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Steps {
    pub brightness: u32,
    pub hue: u32,
    pub saturation: u32,
    pub temperature: u32,
}

/// Single step adjustments understood by some device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nudge {
    Brighter,
    Dimmer,
    Warmer,
    Cooler,
    WhiteUp,
    WhiteDown,
    RedUp,
    RedDown,
    GreenUp,
    GreenDown,
    BlueUp,
    BlueDown,
}

impl Nudge {
    /// Brightness and temperature nudges act on whatever zone the bridge has
    /// selected, so they need the zone selected first.
    pub fn requires_selection(&self) -> bool {
        matches!(
            self,
            Nudge::Brighter | Nudge::Dimmer | Nudge::Warmer | Nudge::Cooler
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Nudge::Brighter => "brighter",
            Nudge::Dimmer => "dimmer",
            Nudge::Warmer => "warmer",
            Nudge::Cooler => "cooler",
            Nudge::WhiteUp => "white_up",
            Nudge::WhiteDown => "white_down",
            Nudge::RedUp => "red_up",
            Nudge::RedDown => "red_down",
            Nudge::GreenUp => "green_up",
            Nudge::GreenDown => "green_down",
            Nudge::BlueUp => "blue_up",
            Nudge::BlueDown => "blue_down",
        }
    }
}

/// Identity of the zone a command addresses. The bridge keeps one of these
/// as its current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Selection {
    pub led_type: LedType,
    pub zone: u8,
}

/// The two opaque bytes a v6 bridge hands out during the handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(pub u8, pub u8);

/// Bridge state read (never written) while encoding a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    pub version: u8,
    pub session_id: SessionId,
    pub sequence: u8,
}

/// Generation specific fields of a command, prior to byte assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Body {
    Legacy {
        cmd_1: u8,
        cmd_2: Option<u8>,
    },
    V6 {
        command_type: u8,
        remote_style: u8,
        cmd_1: u8,
        cmd_2: u8,
    },
}

/// A single command for one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    body: Body,
    led_type: LedType,
    zone: u8,
    selection: Option<Box<Command>>,
}

impl Command {
    pub(crate) fn new(body: Body, led_type: LedType, zone: u8) -> Self {
        Command {
            body,
            led_type,
            zone,
            selection: None,
        }
    }

    /// Require `select` to be sent first whenever the bridge has another zone
    /// selected.
    pub(crate) fn selecting(mut self, select: Command) -> Self {
        self.selection = Some(Box::new(select));
        self
    }

    pub fn body(&self) -> Body {
        self.body
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn led_type(&self) -> LedType {
        self.led_type
    }

    pub fn target(&self) -> Selection {
        Selection {
            led_type: self.led_type,
            zone: self.zone,
        }
    }

    pub fn requires_selection(&self) -> bool {
        self.selection.is_some()
    }

    pub fn selection(&self) -> Option<&Command> {
        self.selection.as_deref()
    }

    /// Assemble the frame for the given bridge state.
    pub fn to_bytes(&self, ctx: &FrameContext) -> Bytes {
        match self.body {
            Body::Legacy { cmd_1, cmd_2 } => legacy::encode(cmd_1, cmd_2, ctx.version),
            Body::V6 {
                command_type,
                remote_style,
                cmd_1,
                cmd_2,
            } => v6::encode(command_type, remote_style, cmd_1, cmd_2, self.zone, ctx),
        }
    }
}

/// Operations whose availability depends on the device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    NightLight,
    White,
    Hue,
    Saturation,
    Brightness,
    Temperature,
    Nudge(Nudge),
    Link,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::NightLight => "night_light",
            Operation::White => "white",
            Operation::Hue => "hue",
            Operation::Saturation => "saturation",
            Operation::Brightness => "brightness",
            Operation::Temperature => "temperature",
            Operation::Nudge(nudge) => nudge.name(),
            Operation::Link => "link",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Codec {
    Legacy(&'static legacy::Table),
    V6(&'static v6::Table),
}

struct Capability {
    generation: Generation,
    led_type: LedType,
    codec: Codec,
}

const CAPABILITIES: &[Capability] = &[
    Capability {
        generation: Generation::Legacy,
        led_type: LedType::White,
        codec: Codec::Legacy(&legacy::WHITE),
    },
    Capability {
        generation: Generation::Legacy,
        led_type: LedType::Rgbw,
        codec: Codec::Legacy(&legacy::RGBW),
    },
    Capability {
        generation: Generation::V6,
        led_type: LedType::BridgeLed,
        codec: Codec::V6(&v6::BRIDGE_LED),
    },
    Capability {
        generation: Generation::V6,
        led_type: LedType::White,
        codec: Codec::V6(&v6::WHITE),
    },
    Capability {
        generation: Generation::V6,
        led_type: LedType::Dimmer,
        codec: Codec::V6(&v6::DIMMER),
    },
    Capability {
        generation: Generation::V6,
        led_type: LedType::Rgbw,
        codec: Codec::V6(&v6::RGBW),
    },
    Capability {
        generation: Generation::V6,
        led_type: LedType::Rgbww,
        codec: Codec::V6(&v6::RGBWW),
    },
    Capability {
        generation: Generation::V6,
        led_type: LedType::Wrgb,
        codec: Codec::V6(&v6::WRGB),
    },
    Capability {
        generation: Generation::V6,
        led_type: LedType::Rgbcct,
        codec: Codec::V6(&v6::RGBCCT),
    },
];

/// The commands one group can send, for one bridge version.
#[derive(Debug, Clone)]
pub struct CommandSet {
    led_type: LedType,
    zone: u8,
    codec: Codec,
}

impl CommandSet {
    /// Look up the command set for a (version, LED type) pair.
    ///
    /// Fails with an invalid-argument error when the bridge version is
    /// unknown, the combination has no command set, or the zone is outside
    /// the range the family supports.
    pub fn new(version: u8, led_type: LedType, zone: u8) -> Result<Self> {
        let generation = Generation::of(version)?;
        let capability = CAPABILITIES
            .iter()
            .find(|c| c.generation == generation && c.led_type == led_type)
            .ok_or(Error::UnsupportedLedType { version, led_type })?;
        let max = match capability.codec {
            Codec::Legacy(_) => legacy::MAX_ZONE,
            Codec::V6(table) => table.max_zone,
        };
        if zone == 0 || zone > max {
            return Err(Error::InvalidZone { zone, max });
        }
        Ok(CommandSet {
            led_type,
            zone,
            codec: capability.codec,
        })
    }

    pub fn led_type(&self) -> LedType {
        self.led_type
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn steps(&self) -> Steps {
        match self.codec {
            Codec::Legacy(table) => table.steps,
            Codec::V6(_) => v6::STEPS,
        }
    }

    pub fn supports(&self, operation: Operation) -> bool {
        match self.codec {
            Codec::Legacy(table) => table.supports(operation),
            Codec::V6(table) => table.supports(operation),
        }
    }

    pub fn on(&self) -> Command {
        match self.codec {
            Codec::Legacy(table) => table.on(self.led_type, self.zone),
            Codec::V6(table) => table.on(self.led_type, self.zone),
        }
    }

    pub fn off(&self) -> Command {
        match self.codec {
            Codec::Legacy(table) => table.off(self.led_type, self.zone),
            Codec::V6(table) => table.off(self.led_type, self.zone),
        }
    }

    pub fn night_light(&self) -> Result<Command> {
        let command = match self.codec {
            Codec::Legacy(table) => table.night_light(self.led_type, self.zone),
            Codec::V6(table) => table.night_light(self.led_type, self.zone),
        };
        self.supported(Operation::NightLight, command)
    }

    /// Switch to white mode. Families that express white as a color
    /// temperature use `temperature` for it.
    pub fn white(&self, temperature: f64) -> Result<Command> {
        let temperature = check_unit("temperature", temperature)?;
        let command = match self.codec {
            Codec::Legacy(table) => table.white(self.led_type, self.zone),
            Codec::V6(table) => table.white(self.led_type, self.zone, temperature),
        };
        self.supported(Operation::White, command)
    }

    pub fn hue(&self, hue: f64) -> Result<Command> {
        let hue = check_unit("hue", hue)?;
        let command = match self.codec {
            Codec::Legacy(table) => table.hue(self.led_type, self.zone, hue),
            Codec::V6(table) => table.hue(self.led_type, self.zone, hue),
        };
        self.supported(Operation::Hue, command)
    }

    pub fn saturation(&self, saturation: f64) -> Result<Command> {
        let saturation = check_unit("saturation", saturation)?;
        let command = match self.codec {
            Codec::Legacy(_) => None,
            Codec::V6(table) => table.saturation(self.led_type, self.zone, saturation),
        };
        self.supported(Operation::Saturation, command)
    }

    pub fn brightness(&self, brightness: f64) -> Result<Command> {
        let brightness = check_unit("brightness", brightness)?;
        let command = match self.codec {
            Codec::Legacy(table) => table.brightness(self.led_type, self.zone, brightness),
            Codec::V6(table) => table.brightness(self.led_type, self.zone, brightness),
        };
        self.supported(Operation::Brightness, command)
    }

    pub fn temperature(&self, temperature: f64) -> Result<Command> {
        let temperature = check_unit("temperature", temperature)?;
        let command = match self.codec {
            Codec::Legacy(_) => None,
            Codec::V6(table) => table.temperature(self.led_type, self.zone, temperature),
        };
        self.supported(Operation::Temperature, command)
    }

    pub fn nudge(&self, nudge: Nudge) -> Result<Command> {
        let command = match self.codec {
            Codec::Legacy(table) => table.nudge(self.led_type, self.zone, nudge),
            Codec::V6(table) => table.nudge(self.led_type, self.zone, nudge),
        };
        self.supported(Operation::Nudge(nudge), command)
    }

    /// Pair new bulbs with this zone. Only v6 bridges can do this.
    pub fn link(&self) -> Result<Command> {
        let command = match self.codec {
            Codec::Legacy(_) => None,
            Codec::V6(table) => table.pairing(self.led_type, self.zone, v6::TYPE_LINK),
        };
        self.supported(Operation::Link, command)
    }

    pub fn unlink(&self) -> Result<Command> {
        let command = match self.codec {
            Codec::Legacy(_) => None,
            Codec::V6(table) => table.pairing(self.led_type, self.zone, v6::TYPE_UNLINK),
        };
        self.supported(Operation::Link, command)
    }

    fn supported(&self, operation: Operation, command: Option<Command>) -> Result<Command> {
        command.ok_or(Error::Unsupported {
            operation: operation.name(),
            led_type: self.led_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_lookup() {
        let white = CommandSet::new(5, LedType::White, 1).unwrap();
        assert_eq!(white.steps().brightness, 10);
        assert_eq!(white.steps().temperature, 10);
        let rgbw = CommandSet::new(5, LedType::Rgbw, 2).unwrap();
        assert_eq!(rgbw.steps().brightness, 25);
        assert_eq!(rgbw.steps().hue, 255);
    }

    #[test]
    fn test_v6_lookup() {
        for led_type in [
            LedType::BridgeLed,
            LedType::White,
            LedType::Dimmer,
            LedType::Rgbw,
            LedType::Rgbww,
            LedType::Wrgb,
            LedType::Rgbcct,
        ] {
            let set = CommandSet::new(6, led_type, 1).unwrap();
            assert_eq!(set.steps(), v6::STEPS);
        }
    }

    #[test]
    fn test_bad_lookup() {
        assert!(matches!(
            CommandSet::new(5, LedType::Rgbww, 1),
            Err(Error::UnsupportedLedType { version: 5, .. })
        ));
        assert!(matches!(
            CommandSet::new(7, LedType::Rgbw, 1),
            Err(Error::UnsupportedVersion(7))
        ));
        assert!(matches!(
            CommandSet::new(0, LedType::Rgbw, 1),
            Err(Error::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn test_zone_bounds() {
        assert!(CommandSet::new(5, LedType::Rgbw, 4).is_ok());
        assert!(matches!(
            CommandSet::new(5, LedType::Rgbw, 5),
            Err(Error::InvalidZone { zone: 5, max: 4 })
        ));
        assert!(matches!(
            CommandSet::new(6, LedType::Rgbw, 0),
            Err(Error::InvalidZone { zone: 0, max: 4 })
        ));
        assert!(CommandSet::new(6, LedType::Rgbcct, 8).is_ok());
        assert!(CommandSet::new(6, LedType::Rgbcct, 9).is_err());
    }

    #[test]
    fn test_out_of_range_rejected_before_encoding() {
        let set = CommandSet::new(6, LedType::Rgbww, 1).unwrap();
        assert!(matches!(
            set.brightness(1.5),
            Err(Error::OutOfRange {
                name: "brightness",
                ..
            })
        ));
        assert!(set.hue(-0.1).is_err());
        assert!(set.saturation(2.0).is_err());
        assert!(set.temperature(-1.0).is_err());
    }

    #[test]
    fn test_unsupported_operations() {
        let white = CommandSet::new(5, LedType::White, 1).unwrap();
        assert!(matches!(
            white.hue(0.5),
            Err(Error::Unsupported {
                operation: "hue",
                led_type: LedType::White
            })
        ));
        assert!(!white.supports(Operation::Brightness));
        assert!(white.supports(Operation::Nudge(Nudge::Brighter)));
        let rgbw = CommandSet::new(6, LedType::Rgbw, 1).unwrap();
        assert!(rgbw.supports(Operation::Hue));
        assert!(!rgbw.supports(Operation::Saturation));
        assert!(rgbw.link().is_ok());
        let legacy = CommandSet::new(4, LedType::Rgbw, 1).unwrap();
        assert!(legacy.link().is_err());
    }

    #[test]
    fn test_command_selection() {
        let set = CommandSet::new(5, LedType::Rgbw, 1).unwrap();
        let command = set.brightness(0.5).unwrap();
        assert!(command.requires_selection());
        assert_eq!(command.selection(), Some(&set.on()));
        assert_eq!(
            command.target(),
            Selection {
                led_type: LedType::Rgbw,
                zone: 1
            }
        );
        assert!(!set.on().requires_selection());
    }

    #[test]
    fn test_led_type_parse() {
        assert_eq!("RGBW".parse::<LedType>().unwrap(), LedType::Rgbw);
        assert_eq!("bridge-led".parse::<LedType>().unwrap(), LedType::BridgeLed);
        assert!("bad".parse::<LedType>().is_err());
        assert_eq!(LedType::Rgbcct.to_string(), "rgbcct");
    }
}
