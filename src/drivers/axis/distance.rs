// SPDX-License-Identifier: GPL-3.0-or-later

use num::{Float, ToPrimitive};

use crate::consts::hardware::*;

// Positions are kept as integer step counts, so that recording and replaying
// a pose never loses accuracy through floating points. Units (degrees for pan
// and tilt, millimetres for the slider) only exist at the edges.

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Steps(pub i64);

impl core::ops::Add for Steps {
    type Output = Steps;
    fn add(self, rhs: Self) -> Self::Output {
        Steps(self.0 + rhs.0)
    }
}

impl core::ops::Sub for Steps {
    type Output = Steps;
    fn sub(self, rhs: Self) -> Self::Output {
        Steps(self.0 - rhs.0)
    }
}

impl core::ops::Neg for Steps {
    type Output = Steps;

    fn neg(self) -> Self::Output {
        Steps(-self.0)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Axis {
    Pan,
    Tilt,
    Slider,
}

impl Axis {
    /// Order matters: this is the layout of every per-axis array.
    pub const ALL: [Axis; 3] = [Axis::Pan, Axis::Tilt, Axis::Slider];

    pub fn index(self) -> usize {
        match self {
            Axis::Pan => 0,
            Axis::Tilt => 1,
            Axis::Slider => 2,
        }
    }

    pub fn is_rotary(self) -> bool {
        self != Axis::Slider
    }

    pub fn unit(self) -> &'static str {
        if self.is_rotary() { "deg" } else { "mm" }
    }
}

/// Microstepping resolution of the drivers. The value is the number of
/// microsteps per full motor step.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StepMode {
    Full = 1,
    Half = 2,
    Quarter = 4,
    Eighth = 8,
    Sixteenth = 16,
}

impl StepMode {
    pub fn from_divisor(divisor: u32) -> Option<Self> {
        Some(match divisor {
            1 => StepMode::Full,
            2 => StepMode::Half,
            4 => StepMode::Quarter,
            8 => StepMode::Eighth,
            16 => StepMode::Sixteenth,
            _ => return None,
        })
    }

    pub fn divisor(self) -> u32 {
        self as u32
    }

    /// Factor to apply to a step count recorded in `self` to express it in `other`.
    pub fn ratio_to(self, other: StepMode) -> f64 {
        other.divisor() as f64 / self.divisor() as f64
    }
}

impl Default for StepMode {
    fn default() -> Self {
        StepMode::Sixteenth
    }
}

/// Converts between steps and engineering units for one axis.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct UnitConverter {
    steps_per_unit: f64,
}

impl UnitConverter {
    pub fn for_axis(axis: Axis, mode: StepMode) -> Self {
        let steps_per_motor_rev = FULL_STEPS_PER_REVOLUTION * mode.divisor() as f64;
        let steps_per_unit = match axis {
            Axis::Pan => steps_per_motor_rev * PAN_GEAR_RATIO / 360.0,
            Axis::Tilt => steps_per_motor_rev * TILT_GEAR_RATIO / 360.0,
            Axis::Slider => steps_per_motor_rev / (SLIDER_PULLEY_TEETH * SLIDER_BELT_PITCH_MM),
        };
        Self { steps_per_unit }
    }

    pub fn steps_per_unit(&self) -> f64 {
        self.steps_per_unit
    }

    /// Fractional step count, used for speeds (steps/s from units/s).
    pub fn to_steps_f64<T: ToPrimitive>(&self, units: T) -> f64 {
        units.to_f64().unwrap_or(0.0) * self.steps_per_unit
    }

    /// Nearest whole step.
    pub fn to_steps<T: ToPrimitive>(&self, units: T) -> Steps {
        Steps(self.to_steps_f64(units).round() as i64)
    }

    /// Accepts any numeric step representation: positions (`i64`, `Steps.0`)
    /// as well as speeds (`f64` steps/s).
    pub fn to_units<T: ToPrimitive>(&self, steps: T) -> f64 {
        steps.to_f64().unwrap_or(0.0) / self.steps_per_unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sixteenth_step_ratios() {
        let pan = UnitConverter::for_axis(Axis::Pan, StepMode::Sixteenth);
        assert_relative_eq!(pan.steps_per_unit(), 3200.0 * 144.0 / 17.0 / 360.0, epsilon = 1e-9);

        let slider = UnitConverter::for_axis(Axis::Slider, StepMode::Sixteenth);
        assert_relative_eq!(slider.steps_per_unit(), 3200.0 / 72.0, epsilon = 1e-9);
    }

    #[test]
    fn units_survive_a_step_mode_change() {
        for axis in Axis::ALL {
            for (from, to) in [
                (StepMode::Sixteenth, StepMode::Half),
                (StepMode::Quarter, StepMode::Eighth),
                (StepMode::Full, StepMode::Sixteenth),
            ] {
                let old = UnitConverter::for_axis(axis, from);
                let new = UnitConverter::for_axis(axis, to);

                let degrees = 37.25;
                let steps = old.to_steps_f64(degrees) * from.ratio_to(to);
                assert_relative_eq!(new.to_units(steps), degrees, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn rounds_to_the_nearest_step() {
        let slider = UnitConverter::for_axis(Axis::Slider, StepMode::Full);
        // 200/72 steps per mm
        assert_eq!(slider.to_steps(1.0), Steps(3));
        assert_eq!(slider.to_steps(-1.0), Steps(-3));
        assert_eq!(slider.to_steps(0.1), Steps(0));
        assert_eq!(slider.to_steps(10_i32), Steps(28));
    }

    #[test]
    fn step_mode_divisors() {
        assert_eq!(StepMode::from_divisor(8), Some(StepMode::Eighth));
        assert_eq!(StepMode::from_divisor(3), None);
        assert_relative_eq!(StepMode::Sixteenth.ratio_to(StepMode::Quarter), 0.25);
    }
}
