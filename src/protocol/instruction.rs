// SPDX-License-Identifier: GPL-3.0-or-later

use crate::drivers::axis::{Axes, Axis};
use crate::errors::{Error, Result};

/// First byte of a direct speed command, followed by three big endian i16
/// speeds in steps/s: slider, pan, tilt.
pub const SPEEDS_OPCODE: u8 = 4;
pub const SPEEDS_PAYLOAD_LEN: usize = 6;

/// Sent by the bluetooth module when a host connects. Not an instruction.
pub const CONNECTING_BANNER: u8 = b'+';

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Instruction {
    // Motion
    SetStepMode(u32),
    /// Degrees or mm.
    MoveAxis(Axis, f64),
    /// Steps/s, indexed by axis.
    RunSpeeds([i16; 3]),
    ToggleEnable,
    SetHome,
    Home,

    // Configuration
    SetMaxSpeed(Axis, f64),
    SetInverted(Axis, bool),
    SetHallOffset(Axis, f64),
    SetHomingMode(Axes),
    SetDegreesPerShot(f64),
    SetDelayBetweenShots(u32),
    ToggleAcceleration,
    SetRampIncrement(Axis, u32),
    ToggleLimits,
    SetLimitMin(Axis, f64),
    SetLimitMax(Axis, f64),
    SaveSettings,
    Report,

    // Keyframes
    AddKeyframe,
    AddKeyframeWithDwell(u32),
    EditKeyframe,
    SetDwell(u32),
    ClearKeyframes,
    StepForward,
    StepBackward,
    GotoFirst,
    GotoLast,
    PlayAll(u32),
    ScaleSpeeds(f64),

    // Pictures
    TriggerShutter,
    Panorama,
    Timelapse(u32),
    CalculateTarget,
    Orbit(u32),
}

/// Homing mode codes: 0 none, 1 slider, 2 pan and tilt, 3 everything.
pub fn homing_mode_from_code(code: i64) -> Option<Axes> {
    match code {
        0 => Some(Axes::empty()),
        1 => Some(Axes::SLIDER),
        2 => Some(Axes::PAN_TILT),
        3 => Some(Axes::all()),
        _ => None,
    }
}

// Like atoi(): "12.7" is 12, and an empty argument is 0.
fn parse_int(arg: &str) -> Result<i64> {
    if arg.is_empty() {
        return Ok(0);
    }
    arg.parse::<i64>()
        .or_else(|_| arg.parse::<f64>().map(|v| v as i64))
        .map_err(|_| Error::InvalidArgument)
}

fn parse_float(arg: &str) -> Result<f64> {
    if arg.is_empty() {
        return Ok(0.0);
    }
    arg.parse::<f64>().map_err(|_| Error::InvalidArgument)
}

// Counts and durations. Negative values mean 0.
fn parse_u32(arg: &str) -> Result<u32> {
    Ok(parse_int(arg)?.clamp(0, u32::MAX as i64) as u32)
}

impl Instruction {
    /// Decodes a text instruction: its opcode and its (possibly empty)
    /// numeric argument.
    pub fn parse(opcode: u8, arg: &str) -> Result<Self> {
        use Instruction::*;

        let int = || parse_int(arg);
        let float = || parse_float(arg);
        let count = || parse_u32(arg);

        Ok(match opcode {
            b'm' => SetStepMode(count()?),
            b'p' => MoveAxis(Axis::Pan, float()?),
            b't' => MoveAxis(Axis::Tilt, float()?),
            b'x' => MoveAxis(Axis::Slider, float()?),
            b'e' => ToggleEnable,
            b'h' => SetHome,
            b'A' => Home,

            b's' => SetMaxSpeed(Axis::Pan, float()?),
            b'S' => SetMaxSpeed(Axis::Tilt, float()?),
            b'X' => SetMaxSpeed(Axis::Slider, float()?),
            b'i' => SetInverted(Axis::Pan, int()? != 0),
            b'I' => SetInverted(Axis::Tilt, int()? != 0),
            b'j' => SetInverted(Axis::Slider, int()? != 0),
            b'o' => SetHallOffset(Axis::Pan, float()?),
            b'O' => SetHallOffset(Axis::Tilt, float()?),
            b'H' => SetHomingMode(homing_mode_from_code(int()?).ok_or(Error::InvalidArgument)?),
            b'b' => SetDegreesPerShot(float()?),
            b'B' => SetDelayBetweenShots(count()?),
            b'a' => ToggleAcceleration,
            b'q' => SetRampIncrement(Axis::Pan, count()?),
            b'Q' => SetRampIncrement(Axis::Tilt, count()?),
            b'w' => SetRampIncrement(Axis::Slider, count()?),
            b'y' => ToggleLimits,
            b'f' => SetLimitMin(Axis::Pan, float()?),
            b'F' => SetLimitMax(Axis::Pan, float()?),
            b'g' => SetLimitMin(Axis::Tilt, float()?),
            b'G' => SetLimitMax(Axis::Tilt, float()?),
            b'z' => SetLimitMin(Axis::Slider, float()?),
            b'Z' => SetLimitMax(Axis::Slider, float()?),
            b'U' => SaveSettings,
            b'R' => Report,

            b'#' => AddKeyframe,
            b'd' => AddKeyframeWithDwell(count()?),
            b'E' => EditKeyframe,
            b'D' => SetDwell(count()?),
            b'C' => ClearKeyframes,
            b'>' => StepForward,
            b'<' => StepBackward,
            b'[' => GotoFirst,
            b']' => GotoLast,
            b';' => PlayAll(count()?),
            b'W' => ScaleSpeeds(float()?),

            b'c' => TriggerShutter,
            b'L' => Panorama,
            b'l' => Timelapse(count()?),
            b'T' => CalculateTarget,
            b'@' => Orbit(count()?),

            _ => return Err(Error::UnknownInstruction),
        })
    }

    /// Decodes the payload of a direct speed command.
    pub fn from_speeds_payload(payload: [u8; SPEEDS_PAYLOAD_LEN]) -> Self {
        let word = |i: usize| i16::from_be_bytes([payload[2 * i], payload[2 * i + 1]]);
        let (slider, pan, tilt) = (word(0), word(1), word(2));

        let mut speeds = [0; 3];
        speeds[Axis::Pan.index()] = pan;
        speeds[Axis::Tilt.index()] = tilt;
        speeds[Axis::Slider.index()] = slider;
        Instruction::RunSpeeds(speeds)
    }
}
