// SPDX-License-Identifier: GPL-3.0-or-later

// We need to define where 0 is on each axis. Each axis has a hall sensor that
// goes active when a magnet passes in front of it. The slider is homed first,
// then pan and tilt together:
// 1) If we start on a sensor, jog off it.
// 2) Sweep towards negative positions. On a trigger, the axis is zeroed and
//    parked there while the others keep searching.
// 3) Pan and tilt axes that did not trigger do a full positive rotation.
// 4) The sensor triggers on the edge of the magnet. We move by a calibrated
//    offset to center on it, and zero again.

use crate::consts::homing::*;
use crate::drivers::Board;
use crate::drivers::axis::{Axes, Axis, AxisSet, StepperDriver, Steps};
use crate::errors::{Error, Result};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum HomingState {
    Idle,
    MovingOffSensor,
    SearchingCoarse,
    SearchingFine,
    ApplyingOffset,
    Done,
    Failed,
}

pub struct HomingEngine {
    state: HomingState,
    mode: Axes,
    /// Degrees, indexed by axis. The slider has no offset.
    hall_offsets: [f64; 3],
    homed: Axes,
    direction: [i8; 3],
}

impl HomingEngine {
    pub fn new(mode: Axes, hall_offsets: [f64; 3]) -> Self {
        Self {
            state: HomingState::Idle,
            mode,
            hall_offsets,
            homed: Axes::empty(),
            direction: [-1; 3],
        }
    }

    pub fn state(&self) -> HomingState {
        self.state
    }

    pub fn homed(&self) -> Axes {
        self.homed
    }

    /// +1 if the sensor was found while sweeping towards negative positions,
    /// -1 if found on the way back.
    pub fn search_direction(&self, axis: Axis) -> i8 {
        self.direction[axis.index()]
    }

    fn enter(&mut self, state: HomingState) {
        debug!("Homing: {:?}", state);
        self.state = state;
    }

    /// Returns the homed axes, all of them at position 0.
    pub fn run<S: StepperDriver, B: Board>(&mut self, axes: &mut AxisSet<S>, board: &mut B) -> Result<Axes> {
        self.homed = Axes::empty();
        self.direction = [-1; 3];
        self.state = HomingState::Idle;

        for group in [Axes::SLIDER, Axes::PAN_TILT] {
            let group = group & self.mode;
            if group.is_empty() {
                continue;
            }

            self.enter(HomingState::MovingOffSensor);
            if !self.move_off_sensors(axes, board, group) {
                error!("Homing: sensor of {:?} never cleared", group);
                self.enter(HomingState::Failed);
                return Err(Error::HomingFailed);
            }

            let rotary = group & Axes::PAN_TILT;
            for axis in rotary.iter() {
                axes.zero(axis);
            }

            self.enter(HomingState::SearchingCoarse);
            let mut targets = axes.positions();
            for axis in group.iter() {
                let coarse = if axis.is_rotary() { ROTARY_COARSE_DEGREES } else { SLIDER_COARSE_MM };
                targets[axis.index()] = axes.position(axis) + axes.to_steps(axis, coarse);
            }
            self.sweep(axes, board, group, targets, true);

            let missing = rotary - self.homed;
            if !missing.is_empty() {
                self.enter(HomingState::SearchingFine);
                let mut targets = axes.positions();
                for axis in missing.iter() {
                    targets[axis.index()] = axes.to_steps(axis, ROTARY_FINE_SWEEP_DEGREES);
                }
                self.sweep(axes, board, missing, targets, false);
            }

            if !rotary.is_empty() && self.homed.contains(rotary) {
                self.enter(HomingState::ApplyingOffset);
                let mut targets = axes.positions();
                for axis in rotary.iter() {
                    let offset = self.hall_offsets[axis.index()] * self.direction[axis.index()] as f64;
                    targets[axis.index()] = axes.to_steps(axis, offset);
                }
                axes.move_to(targets);
                for axis in rotary.iter() {
                    axes.zero(axis);
                }
            }
        }

        if self.homed.contains(self.mode) {
            self.enter(HomingState::Done);
            info!("Homing done: {:?}", self.homed);
            Ok(self.homed)
        } else {
            warn!("Homing failed, no trigger on {:?}", self.mode - self.homed);
            self.enter(HomingState::Failed);
            Err(Error::HomingFailed)
        }
    }

    /// Jogs the axes of `group` whose sensor is active until it clears.
    /// Returns false if a sensor stays active over the whole runaway distance.
    fn move_off_sensors<S: StepperDriver, B: Board>(
        &mut self,
        axes: &mut AxisSet<S>,
        board: &mut B,
        group: Axes,
    ) -> bool {
        let mut jogged = [0.0; 3];

        loop {
            let active: Axes = group.iter().filter(|axis| board.home_sensor_active(*axis)).collect();
            if active.is_empty() {
                return true;
            }

            let stuck = active.iter().all(|axis| {
                let runaway = if axis.is_rotary() { ROTARY_RUNAWAY_DEGREES } else { SLIDER_RUNAWAY_MM };
                jogged[axis.index()] >= runaway
            });
            if stuck {
                return false;
            }

            let mut targets = axes.positions();
            for axis in active.iter() {
                let jog = if axis.is_rotary() { ROTARY_JOG_DEGREES } else { SLIDER_JOG_MM };
                // A jog shorter than a step at coarse step modes still moves.
                let steps = Steps(axes.to_steps(axis, jog).0.max(1));
                targets[axis.index()] = targets[axis.index()] + steps;
                jogged[axis.index()] += axes.to_units(axis, steps);
            }
            axes.move_to(targets);
        }
    }

    /// Moves to `targets`, zeroing and parking each axis of `searching` as
    /// soon as its sensor triggers.
    fn sweep<S: StepperDriver, B: Board>(
        &mut self,
        axes: &mut AxisSet<S>,
        board: &mut B,
        searching: Axes,
        mut targets: [Steps; 3],
        coarse: bool,
    ) {
        let mut remaining = searching;
        axes.set_targets(targets);

        while axes.run() {
            let mut triggered = Axes::empty();
            for axis in remaining.iter() {
                if board.home_sensor_active(axis) {
                    triggered |= Axes::from(axis);
                }
            }
            if triggered.is_empty() {
                continue;
            }

            for axis in triggered.iter() {
                debug!("Homing: {:?} triggered", axis);
                axes.zero(axis);
                targets[axis.index()] = Steps(0);
                if coarse {
                    self.direction[axis.index()] = 1;
                }
            }
            remaining -= triggered;
            self.homed |= triggered;
            axes.set_targets(targets);
        }

        for axis in Axis::ALL {
            axes.driver_mut(axis).set_speed(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::axis::StepMode;
    use crate::util::sim::{sim_axes, SimBoard, SimStepper};

    fn board_with_sensor_windows(
        axes: &AxisSet<SimStepper>,
        windows: [Option<core::ops::RangeInclusive<i64>>; 3],
    ) -> SimBoard {
        let mut board = SimBoard::new();
        for axis in Axis::ALL {
            if let Some(window) = windows[axis.index()].clone() {
                board = board.with_sensor(axis, axes.driver(axis).position_cell(), window);
            }
        }
        board
    }

    #[test]
    fn homes_pan_and_tilt_on_the_coarse_sweep() {
        let mut axes = sim_axes();
        let mut board = board_with_sensor_windows(&axes, [Some(-600..=-500), Some(-1000..=-900), None]);

        let mut homing = HomingEngine::new(Axes::PAN_TILT, [2.0, -1.5, 0.0]);
        assert_eq!(homing.run(&mut axes, &mut board), Ok(Axes::PAN_TILT));
        assert_eq!(homing.state(), HomingState::Done);
        assert_eq!(homing.search_direction(Axis::Pan), 1);
        assert_eq!(axes.positions(), [Steps(0); 3]);
        assert!(axes.is_idle());
    }

    #[test]
    fn fine_sweep_finds_a_sensor_behind() {
        let mut axes = sim_axes();
        let cell = axes.driver(Axis::Pan).position_cell();
        let mut board = board_with_sensor_windows(&axes, [Some(500..=600), None, None]);

        let mut homing = HomingEngine::new(Axes::PAN, [2.0, 0.0, 0.0]);
        assert_eq!(homing.run(&mut axes, &mut board), Ok(Axes::PAN));
        assert_eq!(homing.search_direction(Axis::Pan), -1);
        assert_eq!(axes.position(Axis::Pan), Steps(0));
        // The trigger was at 500, then we moved back by 2 degrees (151 steps).
        assert_eq!(cell.get(), 500 - 151);
    }

    #[test]
    fn slider_homes_first() {
        let mut axes = sim_axes();
        let mut board = board_with_sensor_windows(
            &axes,
            [Some(-300..=-200), Some(-300..=-200), Some(-2000..=-1990)],
        );

        let mut homing = HomingEngine::new(Axes::all(), [0.0; 3]);
        assert_eq!(homing.run(&mut axes, &mut board), Ok(Axes::all()));
        assert_eq!(axes.positions(), [Steps(0); 3]);
        assert!(board.sensor_reads(Axis::Slider) > 0);
    }

    #[test]
    fn missing_sensor_fails() {
        let mut axes = sim_axes();
        let mut board = board_with_sensor_windows(&axes, [Some(-600..=-500), None, None]);

        let mut homing = HomingEngine::new(Axes::PAN_TILT, [0.0; 3]);
        assert_eq!(homing.run(&mut axes, &mut board), Err(Error::HomingFailed));
        assert_eq!(homing.state(), HomingState::Failed);
        assert_eq!(homing.homed(), Axes::PAN);
    }

    #[test]
    fn stuck_sensor_fails() {
        let mut axes = sim_axes();
        let mut board = board_with_sensor_windows(&axes, [Some(i64::MIN..=i64::MAX), None, None]);

        let mut homing = HomingEngine::new(Axes::PAN, [0.0; 3]);
        assert_eq!(homing.run(&mut axes, &mut board), Err(Error::HomingFailed));
        // Jogs of 75 steps (0.996 degree) until 360 degrees are covered.
        assert_eq!(axes.position(Axis::Pan), Steps(362 * 75));
    }

    #[test]
    fn starting_on_the_sensor() {
        let mut axes = sim_axes();
        let mut board = board_with_sensor_windows(&axes, [None, Some(-10..=10), None]);

        let mut homing = HomingEngine::new(Axes::TILT, [0.0; 3]);
        assert_eq!(homing.run(&mut axes, &mut board), Ok(Axes::TILT));
        assert_eq!(axes.position(Axis::Tilt), Steps(0));
    }

    #[test]
    fn full_step_slider_jogs_off_its_sensor() {
        let mut axes = AxisSet::new(SimStepper::new(), SimStepper::new(), SimStepper::new(), StepMode::Full);
        axes.set_max_speed_units(Axis::Slider, 15.0);
        let cell = axes.driver(Axis::Slider).position_cell();
        let mut board = board_with_sensor_windows(&axes, [None, None, Some(-50..=2)]);

        // A 0.1mm jog is less than a full step, each jog still moves one.
        let mut homing = HomingEngine::new(Axes::SLIDER, [0.0; 3]);
        assert_eq!(homing.run(&mut axes, &mut board), Ok(Axes::SLIDER));
        assert_eq!(axes.position(Axis::Slider), Steps(0));
        assert_eq!(cell.get(), 2);
    }

    #[test]
    fn nothing_to_home() {
        let mut axes = sim_axes();
        let mut board = SimBoard::new();
        let mut homing = HomingEngine::new(Axes::empty(), [0.0; 3]);
        assert_eq!(homing.run(&mut axes, &mut board), Ok(Axes::empty()));
        assert_eq!(board.now_us(), 0);
    }
}
