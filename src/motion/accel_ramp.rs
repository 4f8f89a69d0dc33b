// SPDX-License-Identifier: GPL-3.0-or-later

// Velocity blending between keyframes. This is not a kinematic profile: the
// speed of each axis goes from its live value to the cruise speed of the move
// in 100 equal increments, one every `increment_us`. When the axis is about to
// stop or turn around at the keyframe, the move is aimed a bit short of it,
// by a distance fitted on the real mount, so the slowdown ends on the pose.

use crate::consts::accel_ramp::*;
use crate::drivers::Board;
use crate::drivers::axis::{Axis, AxisSet, StepperDriver, Steps};

use super::{Keyframe, KeyframeStore};

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct AccelRamp {
    pub increment_us: [u32; 3],
}

impl Default for AccelRamp {
    fn default() -> Self {
        Self {
            increment_us: [
                DEFAULT_PAN_INCREMENT_US,
                DEFAULT_TILT_INCREMENT_US,
                DEFAULT_SLIDER_INCREMENT_US,
            ],
        }
    }
}

impl AccelRamp {
    /// Distance covered while slowing down from `speed`, signed like `speed`.
    pub fn deceleration_distance(&self, axis: Axis, speed: f64) -> Steps {
        let increment_s = self.increment_us[axis.index()] as f64 * INCREMENT_US_TO_SECONDS;
        if speed == 0.0 || increment_s == 0.0 {
            return Steps(0);
        }
        let accel = speed / increment_s;
        Steps((speed * speed / (DECELERATION_DISTANCE_DIVISOR * accel)) as i64)
    }

    /// Moves to keyframe `index` of `store`, blending from the live speeds.
    /// The keyframe must exist. The dwell is left to the caller.
    pub fn move_to_keyframe<S, B, const N: usize>(
        &self,
        axes: &mut AxisSet<S>,
        store: &KeyframeStore<N>,
        index: usize,
        board: &mut B,
    ) where
        S: StepperDriver,
        B: Board,
    {
        let keyframe = match store.get(index) {
            Some(k) => *k,
            None => return,
        };
        let previous = index.checked_sub(1).and_then(|i| store.get(i)).copied();
        let next = store.get(index + 1).copied();

        axes.set_max_speeds(keyframe.speeds);

        // After a dwell, the axes start from rest.
        let initial = match previous {
            Some(p) if p.dwell_ms != 0 => [0.0; 3],
            _ => axes.speeds(),
        };

        axes.set_targets(keyframe.positions);
        let cruise = axes.speeds();

        let mut targets = keyframe.positions;
        let mut delta = [0.0; 3];

        for axis in Axis::ALL {
            let i = axis.index();
            delta[i] = cruise[i] - initial[i];

            if let Some(next) = next.filter(|_| keyframe.dwell_ms == 0) {
                if stops_or_reverses(&keyframe, &next, axis, cruise[i]) {
                    targets[i] = keyframe.positions[i] - self.deceleration_distance(axis, cruise[i]);
                }
            }

            if let Some(previous) = previous {
                let traveled = keyframe.positions[i] - previous.positions[i];
                if traveled.0 == 0 && delta[i] == 0.0 {
                    delta[i] = -STOP_DELTA_FACTOR * cruise[i];
                }
            }
        }

        axes.set_targets(targets);

        if axes.positions() == targets {
            return;
        }

        self.ramp(axes, initial, delta, board);

        axes.set_targets(targets);
        axes.run_to_position();
    }

    fn ramp<S: StepperDriver, B: Board>(
        &self,
        axes: &mut AxisSet<S>,
        initial: [f64; 3],
        delta: [f64; 3],
        board: &mut B,
    ) {
        let mut percent = [0u32; 3];
        let mut last_increment_us: [Option<u64>; 3] = [None; 3];

        while percent.iter().any(|p| *p < RAMP_PERCENT_STEPS) && axes.run_at_speed() {
            let now = board.micros();

            for axis in Axis::ALL {
                let i = axis.index();
                let due = match last_increment_us[i] {
                    None => true,
                    Some(last) => now.wrapping_sub(last) >= self.increment_us[i] as u64,
                };
                if !due {
                    continue;
                }

                percent[i] = (percent[i] + 1).min(RAMP_PERCENT_STEPS);
                last_increment_us[i] = Some(now);

                let fraction = percent[i] as f64 / RAMP_PERCENT_STEPS as f64;
                axes.driver_mut(axis).set_speed(initial[i] + delta[i] * fraction);
            }
        }
    }
}

fn stops_or_reverses(current: &Keyframe, next: &Keyframe, axis: Axis, speed: f64) -> bool {
    let diff = (next.position(axis) - current.position(axis)).0;
    (diff == 0 && speed != 0.0) || (diff > 0 && speed < 0.0) || (diff < 0 && speed > 0.0)
}
