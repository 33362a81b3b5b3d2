use std::str::FromStr;

use clap::ValueEnum;
use palette::{FromColor, Hsv, Srgb};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RGB {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl RGB {
    pub const WHITE: RGB = RGB::new(255, 255, 255);
    pub const RED: RGB = RGB::new(255, 0, 0);
    pub const GREEN: RGB = RGB::new(0, 255, 0);
    pub const BLUE: RGB = RGB::new(0, 0, 255);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        RGB { red, green, blue }
    }

    /**
     * Fully saturated, full value color for a hue and saturation given as
     * decimal percentages.
     */
    pub fn from_hue_saturation(hue: f64, saturation: f64) -> Self {
        let hsv = Hsv::new(hue as f32 * 360.0, saturation as f32, 1.0);
        let (r, g, b) = Srgb::from_color(hsv).into_components();
        RGB::new(to_byte(r), to_byte(g), to_byte(b))
    }

    fn hsv(&self) -> Hsv {
        let srgb = Srgb::new(
            f32::from(self.red) / 255.0,
            f32::from(self.green) / 255.0,
            f32::from(self.blue) / 255.0,
        );
        Hsv::from_color(srgb)
    }

    /// Hue in 0.0..1.0. Greys report 0.0.
    pub fn hue(&self) -> f64 {
        let hsv = self.hsv();
        if hsv.saturation == 0.0 {
            return 0.0;
        }
        f64::from(hsv.hue.into_positive_degrees() / 360.0)
    }

    pub fn saturation(&self) -> f64 {
        f64::from(self.hsv().saturation)
    }

    /// The HSV value, used as brightness by bulbs that take colors as
    /// hue, saturation and brightness.
    pub fn value(&self) -> f64 {
        f64::from(self.hsv().value)
    }
}

fn to_byte(channel: f32) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl From<(u8, u8, u8)> for RGB {
    fn from(tuple: (u8, u8, u8)) -> Self {
        RGB {
            red: tuple.0,
            green: tuple.1,
            blue: tuple.2,
        }
    }
}

impl From<RGB> for (u8, u8, u8) {
    fn from(rgb: RGB) -> Self {
        (rgb.red, rgb.green, rgb.blue)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliColors {
    White,
    Red,
    Green,
    Blue,
    Yellow,
    Orange,
    Purple,
    Cyan,
    Magenta,
    Pink,
    Teal,
}

impl FromStr for CliColors {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "white" => Ok(CliColors::White),
            "red" => Ok(CliColors::Red),
            "green" => Ok(CliColors::Green),
            "blue" => Ok(CliColors::Blue),
            "yellow" => Ok(CliColors::Yellow),
            "orange" => Ok(CliColors::Orange),
            "purple" => Ok(CliColors::Purple),
            "cyan" => Ok(CliColors::Cyan),
            "magenta" => Ok(CliColors::Magenta),
            "pink" => Ok(CliColors::Pink),
            "teal" => Ok(CliColors::Teal),
            _ => Err(Error::InvalidArgument(format!("invalid color: {s}"))),
        }
    }
}

impl From<CliColors> for RGB {
    fn from(color: CliColors) -> Self {
        match color {
            CliColors::White => RGB::WHITE,
            CliColors::Red => RGB::RED,
            CliColors::Green => RGB::GREEN,
            CliColors::Blue => RGB::BLUE,
            CliColors::Yellow => RGB::new(255, 255, 0),
            CliColors::Orange => RGB::new(255, 165, 0),
            CliColors::Purple => RGB::new(128, 0, 128),
            CliColors::Cyan => RGB::new(0, 255, 255),
            CliColors::Magenta => RGB::new(255, 0, 255),
            CliColors::Pink => RGB::new(255, 192, 203),
            CliColors::Teal => RGB::new(0, 128, 128),
        }
    }
}
