// SPDX-License-Identifier: GPL-3.0-or-later

use super::Steps;

/// The step pulse primitive of one axis.
///
/// Implementations generate the STEP/DIR pulses. Speeds are in steps/s and
/// signed: the sign gives the direction. Nothing here blocks, the motion
/// code calls `run_one_tick()` in a tight loop.
pub trait StepperDriver {
    fn set_target_steps(&mut self, target: Steps);
    fn target_steps(&self) -> Steps;

    fn set_max_speed(&mut self, max_speed: f64);
    fn max_speed(&self) -> f64;

    fn set_speed(&mut self, speed: f64);
    fn speed(&self) -> f64;

    /// Does a step if one is due at the current speed, but never past the
    /// target. Returns true while the target is not reached.
    fn run_one_tick(&mut self) -> bool;

    /// Does a step if one is due at the current speed, ignoring the target.
    /// Returns true if a step was done.
    fn run_speed_tick(&mut self) -> bool;

    fn current_position(&self) -> Steps;

    /// Redefines the current position. The target follows, and the speed goes
    /// to 0, so the axis is at rest after this call.
    fn set_current_position(&mut self, position: Steps);

    fn set_direction_inverted(&mut self, inverted: bool);

    fn set_enabled(&mut self, enabled: bool);

    fn distance_to_go(&self) -> Steps {
        self.target_steps() - self.current_position()
    }
}
