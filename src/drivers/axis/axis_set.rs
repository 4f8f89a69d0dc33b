// SPDX-License-Identifier: GPL-3.0-or-later

use bitflags::bitflags;
use num::Float;

use super::{Axis, StepMode, StepperDriver, Steps, UnitConverter};

bitflags! {
    /// A subset of the three axes. Used for the homing mode, the direction
    /// inversion flags, and to report which axes homed.
    #[derive(Default)]
    pub struct Axes: u8 {
        const PAN    = 0b001;
        const TILT   = 0b010;
        const SLIDER = 0b100;
        const PAN_TILT = Self::PAN.bits | Self::TILT.bits;
    }
}

impl From<Axis> for Axes {
    fn from(axis: Axis) -> Self {
        match axis {
            Axis::Pan => Axes::PAN,
            Axis::Tilt => Axes::TILT,
            Axis::Slider => Axes::SLIDER,
        }
    }
}

impl core::iter::FromIterator<Axis> for Axes {
    fn from_iter<I: IntoIterator<Item = Axis>>(iter: I) -> Self {
        iter.into_iter().fold(Axes::empty(), |acc, axis| acc | Axes::from(axis))
    }
}

impl Axes {
    pub fn has(self, axis: Axis) -> bool {
        self.contains(axis.into())
    }

    pub fn iter(self) -> impl Iterator<Item = Axis> {
        Axis::ALL.into_iter().filter(move |a| self.has(*a))
    }
}

/// Snapshot of one axis.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct AxisState {
    pub current_steps: Steps,
    /// steps/s, signed.
    pub current_speed: f64,
    pub max_speed: f64,
    pub steps_per_unit: f64,
}

/// The three step generators, indexed by `Axis`.
pub struct AxisSet<S> {
    drivers: [S; 3],
    converters: [UnitConverter; 3],
    step_mode: StepMode,
}

impl<S: StepperDriver> AxisSet<S> {
    pub fn new(pan: S, tilt: S, slider: S, step_mode: StepMode) -> Self {
        let converters = Axis::ALL.map(|axis| UnitConverter::for_axis(axis, step_mode));
        Self { drivers: [pan, tilt, slider], converters, step_mode }
    }

    pub fn driver(&self, axis: Axis) -> &S {
        &self.drivers[axis.index()]
    }

    pub fn driver_mut(&mut self, axis: Axis) -> &mut S {
        &mut self.drivers[axis.index()]
    }

    pub fn converter(&self, axis: Axis) -> &UnitConverter {
        &self.converters[axis.index()]
    }

    pub fn step_mode(&self) -> StepMode {
        self.step_mode
    }

    pub fn position(&self, axis: Axis) -> Steps {
        self.driver(axis).current_position()
    }

    pub fn positions(&self) -> [Steps; 3] {
        Axis::ALL.map(|axis| self.position(axis))
    }

    pub fn targets(&self) -> [Steps; 3] {
        Axis::ALL.map(|axis| self.driver(axis).target_steps())
    }

    pub fn speeds(&self) -> [f64; 3] {
        Axis::ALL.map(|axis| self.driver(axis).speed())
    }

    pub fn max_speeds(&self) -> [f64; 3] {
        Axis::ALL.map(|axis| self.driver(axis).max_speed())
    }

    /// Degrees for pan and tilt, millimetres for the slider.
    pub fn position_units(&self, axis: Axis) -> f64 {
        self.converter(axis).to_units(self.position(axis).0)
    }

    pub fn to_steps(&self, axis: Axis, units: f64) -> Steps {
        self.converter(axis).to_steps(units)
    }

    pub fn to_units(&self, axis: Axis, steps: Steps) -> f64 {
        self.converter(axis).to_units(steps.0)
    }

    pub fn state(&self, axis: Axis) -> AxisState {
        let driver = self.driver(axis);
        AxisState {
            current_steps: driver.current_position(),
            current_speed: driver.speed(),
            max_speed: driver.max_speed(),
            steps_per_unit: self.converter(axis).steps_per_unit(),
        }
    }

    /// `max_speed` is in units/s.
    pub fn set_max_speed_units(&mut self, axis: Axis, max_speed: f64) {
        let steps_per_sec = self.converter(axis).to_steps_f64(max_speed);
        self.driver_mut(axis).set_max_speed(steps_per_sec);
    }

    pub fn set_max_speeds(&mut self, max_speeds: [f64; 3]) {
        for axis in Axis::ALL {
            self.driver_mut(axis).set_max_speed(max_speeds[axis.index()]);
        }
    }

    pub fn set_speeds(&mut self, speeds: [f64; 3]) {
        for axis in Axis::ALL {
            self.driver_mut(axis).set_speed(speeds[axis.index()]);
        }
    }

    /// Declares the current position of an axis as its zero.
    pub fn zero(&mut self, axis: Axis) {
        self.driver_mut(axis).set_current_position(Steps(0));
    }

    pub fn is_idle(&self) -> bool {
        Axis::ALL.iter().all(|axis| self.driver(*axis).distance_to_go().0 == 0)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        for driver in self.drivers.iter_mut() {
            driver.set_enabled(enabled);
        }
    }

    pub fn set_inverted(&mut self, inverted: super::Axes) {
        for axis in Axis::ALL {
            self.driver_mut(axis).set_direction_inverted(inverted.has(axis));
        }
    }

    /// Changes the microstepping resolution. Positions and max speeds are
    /// rescaled so that they keep the same meaning in units. The axes must be
    /// at rest. Returns the ratio applied, so that recorded step counts can
    /// follow.
    pub fn set_step_mode(&mut self, step_mode: StepMode) -> f64 {
        let ratio = self.step_mode.ratio_to(step_mode);

        for axis in Axis::ALL {
            let driver = self.driver_mut(axis);
            let position = Steps((driver.current_position().0 as f64 * ratio).round() as i64);
            let max_speed = driver.max_speed() * ratio;
            driver.set_current_position(position);
            driver.set_max_speed(max_speed);
            self.converters[axis.index()] = UnitConverter::for_axis(axis, step_mode);
        }

        self.step_mode = step_mode;
        ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::sim::SimStepper;
    use approx::assert_relative_eq;

    fn axis_set() -> AxisSet<SimStepper> {
        AxisSet::new(SimStepper::new(), SimStepper::new(), SimStepper::new(), StepMode::Sixteenth)
    }

    #[test]
    fn step_mode_change_rescales_positions() {
        let mut axes = axis_set();
        axes.driver_mut(Axis::Pan).set_current_position(Steps(1600));
        axes.driver_mut(Axis::Slider).set_current_position(Steps(-800));
        axes.set_max_speed_units(Axis::Pan, 15.0);

        let pan_degrees = axes.position_units(Axis::Pan);
        let pan_max_steps = axes.driver(Axis::Pan).max_speed();

        let ratio = axes.set_step_mode(StepMode::Quarter);
        assert_relative_eq!(ratio, 0.25);
        assert_eq!(axes.position(Axis::Pan), Steps(400));
        assert_eq!(axes.position(Axis::Slider), Steps(-200));
        assert_relative_eq!(axes.position_units(Axis::Pan), pan_degrees, epsilon = 1e-9);
        assert_relative_eq!(axes.driver(Axis::Pan).max_speed(), pan_max_steps / 4.0, epsilon = 1e-9);
        assert_eq!(axes.step_mode(), StepMode::Quarter);
    }

    #[test]
    fn axes_flags() {
        let homing = Axes::PAN_TILT;
        assert!(homing.has(Axis::Pan));
        assert!(!homing.has(Axis::Slider));

        let mut it = (Axes::SLIDER | Axes::PAN).iter();
        assert_eq!(it.next(), Some(Axis::Pan));
        assert_eq!(it.next(), Some(Axis::Slider));
        assert_eq!(it.next(), None);

        let collected: Axes = [Axis::Tilt, Axis::Slider].into_iter().collect();
        assert_eq!(collected, Axes::TILT | Axes::SLIDER);
    }

    #[test]
    fn state_reports_the_driver() {
        let mut axes = axis_set();
        axes.set_max_speed_units(Axis::Slider, 10.0);
        let state = axes.state(Axis::Slider);
        assert_eq!(state.current_steps, Steps(0));
        assert_relative_eq!(state.max_speed, 10.0 * state.steps_per_unit, epsilon = 1e-9);
    }
}
