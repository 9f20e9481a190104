//! Control intents understood by the display controller

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Input signal selectable on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum Signal {
    Sdi,
    Hdmi,
    Dvi,
}

impl Signal {
    /// Every input, in the order diffs and events report them.
    pub const ALL: [Signal; 3] = [Signal::Sdi, Signal::Hdmi, Signal::Dvi];

    /// Bit of this input inside an [`InputMask`].
    pub fn bit(self) -> u8 {
        match self {
            Signal::Sdi => 0x01,
            Signal::Hdmi => 0x02,
            Signal::Dvi => 0x04,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Sdi => "SDI",
            Signal::Hdmi => "HDMI",
            Signal::Dvi => "DVI",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sdi" => Ok(Signal::Sdi),
            "hdmi" => Ok(Signal::Hdmi),
            "dvi" => Ok(Signal::Dvi),
            other => Err(Error::InvalidParameter(format!("unknown signal {:?}", other))),
        }
    }
}

/// Output mode of the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum DisplayMode {
    Blackout,
    Normal,
}

impl DisplayMode {
    pub fn is_blackout(self) -> bool {
        self == DisplayMode::Blackout
    }
}

impl FromStr for DisplayMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blackout" => Ok(DisplayMode::Blackout),
            "normal" => Ok(DisplayMode::Normal),
            other => Err(Error::InvalidParameter(format!("unknown mode {:?}", other))),
        }
    }
}

/// Set of inputs the device reports as enabled.
///
/// The device normally reports exactly one enabled input, but may briefly
/// report none or several while switching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputMask(u8);

impl InputMask {
    const VALID: u8 = 0x07;

    pub fn only(signal: Signal) -> Self {
        Self(signal.bit())
    }

    pub fn contains(self, signal: Signal) -> bool {
        self.0 & signal.bit() != 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for InputMask {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        if bits & !Self::VALID != 0 {
            return Err(Error::MalformedFrame(format!(
                "input mask {:#04x} has unknown bits",
                bits
            )));
        }
        Ok(Self(bits))
    }
}

/// Brightness level as sent on the wire (0..=255)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Brightness(u8);

impl Brightness {
    pub fn from_level(level: u8) -> Self {
        Self(level)
    }

    /// Map an operator percentage onto the device range:
    /// `round(percentage * 255 / 100)`.
    pub fn from_percentage(percentage: f64) -> Result<Self, Error> {
        if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
            return Err(Error::InvalidParameter(format!(
                "brightness percentage {} outside 0..=100",
                percentage
            )));
        }

        let level = (percentage * 255.0 / 100.0).round().clamp(0.0, 255.0);
        Ok(Self(level as u8))
    }

    pub fn level(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Probe,
    SwitchInput(Signal),
    SetMode { blackout: bool },
    SetBrightness(Brightness),
}

impl Command {
    pub fn set_mode(mode: DisplayMode) -> Self {
        Command::SetMode {
            blackout: mode.is_blackout(),
        }
    }

    pub fn brightness_percent(percentage: f64) -> Result<Self, Error> {
        Ok(Command::SetBrightness(Brightness::from_percentage(
            percentage,
        )?))
    }
}
