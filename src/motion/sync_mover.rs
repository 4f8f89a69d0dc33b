// SPDX-License-Identifier: GPL-3.0-or-later

// Coordinated moves: the axis that needs the most time at its own max speed
// sets the duration of the move, and the other axes are slowed down so that
// all three arrive together. There is no acceleration here.

use num::Float;

use crate::drivers::axis::{Axis, AxisSet, StepperDriver, Steps};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MoveOutcome {
    Arrived,
    Interrupted,
}

impl<S: StepperDriver> AxisSet<S> {
    /// Sets the targets and the speed of each axis. Does not move.
    pub fn set_targets(&mut self, targets: [Steps; 3]) {
        let mut longest_time = 0.0;
        let mut movable = [true; 3];

        for axis in Axis::ALL {
            let driver = self.driver(axis);
            let distance = (targets[axis.index()] - driver.current_position()).0;
            if distance == 0 {
                continue;
            }

            if driver.max_speed() <= 0.0 {
                warn!("{:?} has no max speed, it will not move", axis);
                movable[axis.index()] = false;
                continue;
            }

            let time = Float::abs(distance as f64) / driver.max_speed();
            if time > longest_time {
                longest_time = time;
            }
        }

        for axis in Axis::ALL {
            let driver = self.driver_mut(axis);
            let current = driver.current_position();
            let target = if movable[axis.index()] { targets[axis.index()] } else { current };
            driver.set_target_steps(target);

            let speed = if longest_time > 0.0 {
                (target - current).0 as f64 / longest_time
            } else {
                0.0
            };
            driver.set_speed(speed);
        }
    }

    /// One tick on every axis that hasn't arrived. Returns true while any
    /// axis is still moving.
    pub fn run(&mut self) -> bool {
        let mut running = false;
        for axis in Axis::ALL {
            running |= self.driver_mut(axis).run_one_tick();
        }
        running
    }

    /// Like `run()`, but the axes step in the direction of their speed rather
    /// than towards their target. Used while ramping, where the speed can
    /// still point the other way.
    pub fn run_at_speed(&mut self) -> bool {
        let mut running = false;
        for axis in Axis::ALL {
            let driver = self.driver_mut(axis);
            if driver.distance_to_go().0 != 0 {
                driver.run_speed_tick();
                running = true;
            }
        }
        running
    }

    /// Speed-only run: one tick on every axis with a speed, wherever that
    /// takes it. Targets follow the positions, so the axes are idle as soon
    /// as the speeds go to 0. Returns true if any axis stepped.
    pub fn run_free(&mut self) -> bool {
        let mut stepped = false;
        for axis in Axis::ALL {
            let driver = self.driver_mut(axis);
            if driver.speed() != 0.0 && driver.run_speed_tick() {
                let position = driver.current_position();
                driver.set_target_steps(position);
                stepped = true;
            }
        }
        stepped
    }

    /// Blocks until all the axes have reached their current targets. Speeds
    /// are left untouched, so a following move can blend from them.
    pub fn run_to_position(&mut self) {
        while self.run() {}
    }

    /// Blocking synchronized move. The axes are at rest when this returns.
    pub fn move_to(&mut self, targets: [Steps; 3]) -> MoveOutcome {
        self.move_to_until(targets, |_| false)
    }

    /// Same as `move_to()`, except that `interrupt` is polled after every
    /// tick. When it returns true, the axes stop where they are.
    pub fn move_to_until(
        &mut self,
        targets: [Steps; 3],
        mut interrupt: impl FnMut(&mut Self) -> bool,
    ) -> MoveOutcome {
        self.set_targets(targets);

        let outcome = loop {
            if !self.run() {
                break MoveOutcome::Arrived;
            }
            if interrupt(self) {
                break MoveOutcome::Interrupted;
            }
        };

        for axis in Axis::ALL {
            let driver = self.driver_mut(axis);
            if outcome == MoveOutcome::Interrupted {
                let position = driver.current_position();
                driver.set_target_steps(position);
            }
            driver.set_speed(0.0);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::sim::sim_axes;
    use approx::assert_relative_eq;

    #[test]
    fn all_axes_arrive_at_rest() {
        let mut axes = sim_axes();
        for targets in [
            [Steps(1000), Steps(-300), Steps(50)],
            [Steps(0), Steps(0), Steps(-1200)],
            [Steps(-7), Steps(4000), Steps(-1200)],
            [Steps(-7), Steps(4000), Steps(-1200)],
        ] {
            assert_eq!(axes.move_to(targets), MoveOutcome::Arrived);
            assert_eq!(axes.positions(), targets);
            assert_eq!(axes.speeds(), [0.0; 3]);
        }
    }

    #[test]
    fn slowest_axis_bounds_the_move() {
        let mut axes = sim_axes();
        axes.set_max_speeds([1000.0, 1000.0, 100.0]);
        axes.set_targets([Steps(1000), Steps(-500), Steps(200)]);

        // The slider needs 2s, everything else scales to 2s.
        let [pan, tilt, slider] = axes.speeds();
        assert_relative_eq!(pan, 500.0);
        assert_relative_eq!(tilt, -250.0);
        assert_relative_eq!(slider, 100.0);
    }

    #[test]
    fn idle_axes_get_no_speed() {
        let mut axes = sim_axes();
        axes.set_targets([Steps(100), Steps(0), Steps(0)]);
        let [_, tilt, slider] = axes.speeds();
        assert_eq!(tilt, 0.0);
        assert_eq!(slider, 0.0);
    }

    #[test]
    fn axis_without_max_speed_stays_put() {
        let mut axes = sim_axes();
        axes.driver_mut(Axis::Tilt).set_max_speed(0.0);
        assert_eq!(axes.move_to([Steps(100), Steps(100), Steps(0)]), MoveOutcome::Arrived);
        assert_eq!(axes.positions(), [Steps(100), Steps(0), Steps(0)]);
    }

    #[test]
    fn interrupted_move_stops_in_place() {
        let mut axes = sim_axes();
        let outcome = axes.move_to_until([Steps(5000), Steps(0), Steps(0)], |axes| {
            axes.position(Axis::Pan) >= Steps(42)
        });
        assert_eq!(outcome, MoveOutcome::Interrupted);
        assert_eq!(axes.position(Axis::Pan), Steps(42));
        assert!(axes.is_idle());
    }

    #[test]
    fn free_run_follows_the_speeds() {
        let mut axes = sim_axes();
        axes.set_speeds([-1000.0, 0.0, 0.0]);
        for _ in 0..100 {
            axes.run_free();
        }
        // 0.1s at 1000 steps/s, give or take the step being ticked in.
        assert!((-10..=-9).contains(&axes.position(Axis::Pan).0));
        assert_eq!(axes.position(Axis::Tilt), Steps(0));
        assert!(axes.is_idle());
    }
}
