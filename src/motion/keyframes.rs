// SPDX-License-Identifier: GPL-3.0-or-later

use heapless::Vec;
use num::Float;

use crate::drivers::axis::{Axis, AxisSet, StepperDriver, Steps};
use crate::errors::{Error, Result};

/// A recorded pose. Speeds are the max speeds (steps/s) in effect when the
/// pose was recorded, and are the ones used to get there on playback.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Keyframe {
    pub positions: [Steps; 3],
    pub speeds: [f64; 3],
    pub dwell_ms: u32,
}

impl Keyframe {
    pub fn capture<S: StepperDriver>(axes: &AxisSet<S>) -> Self {
        Self {
            positions: axes.positions(),
            speeds: axes.max_speeds(),
            dwell_ms: 0,
        }
    }

    pub fn position(&self, axis: Axis) -> Steps {
        self.positions[axis.index()]
    }

    pub fn speed(&self, axis: Axis) -> f64 {
        self.speeds[axis.index()]
    }
}

pub struct KeyframeStore<const N: usize> {
    keyframes: Vec<Keyframe, N>,
    current_index: Option<usize>,
}

impl<const N: usize> KeyframeStore<N> {
    pub fn new() -> Self {
        Self { keyframes: Vec::new(), current_index: None }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Keyframe> {
        self.keyframes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyframe> {
        self.keyframes.iter()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Playback moved to `index`.
    pub fn set_current_index(&mut self, index: usize) {
        if index < self.len() {
            self.current_index = Some(index);
        }
    }

    /// Appends a keyframe and makes it current.
    pub fn add(&mut self, keyframe: Keyframe) -> Result<usize> {
        self.keyframes.push(keyframe).map_err(|_| Error::CapacityExceeded)?;
        let index = self.keyframes.len() - 1;
        self.current_index = Some(index);
        Ok(index)
    }

    /// Replaces the pose and speeds of the current keyframe. The dwell is kept.
    pub fn edit_current(&mut self, keyframe: Keyframe) -> Result<usize> {
        let index = self.current_index.ok_or(Error::NoCurrentIndex)?;
        let entry = self.keyframes.get_mut(index).ok_or(Error::NoCurrentIndex)?;
        entry.positions = keyframe.positions;
        entry.speeds = keyframe.speeds;
        Ok(index)
    }

    pub fn set_dwell(&mut self, dwell_ms: u32) -> Result<usize> {
        let index = self.current_index.ok_or(Error::NoCurrentIndex)?;
        let entry = self.keyframes.get_mut(index).ok_or(Error::NoCurrentIndex)?;
        entry.dwell_ms = dwell_ms;
        Ok(index)
    }

    pub fn clear(&mut self) {
        self.keyframes.clear();
        self.current_index = None;
    }

    pub fn scale_speeds(&mut self, factor: f64) -> Result<()> {
        if !(factor > 0.0) || !factor.is_finite() {
            return Err(Error::InvalidArgument);
        }
        for keyframe in self.keyframes.iter_mut() {
            for speed in keyframe.speeds.iter_mut() {
                *speed *= factor;
            }
        }
        Ok(())
    }

    /// Rescales the speed of one axis so that its fastest keyframe runs at
    /// `max_speed`.
    pub fn scale_axis_to_max_speed(&mut self, axis: Axis, max_speed: f64) -> Result<()> {
        let current_max = self.keyframes.iter()
            .map(|k| k.speed(axis))
            .fold(0.0, f64::max);

        if !(max_speed > 0.0) || current_max <= 0.0 {
            return Err(Error::InvalidArgument);
        }

        let ratio = max_speed / current_max;
        for keyframe in self.keyframes.iter_mut() {
            keyframe.speeds[axis.index()] *= ratio;
        }
        Ok(())
    }

    /// Follows a change of step mode. `ratio` is new steps / old steps.
    pub fn rescale(&mut self, ratio: f64) {
        for keyframe in self.keyframes.iter_mut() {
            for position in keyframe.positions.iter_mut() {
                *position = Steps((position.0 as f64 * ratio).round() as i64);
            }
            for speed in keyframe.speeds.iter_mut() {
                *speed *= ratio;
            }
        }
    }
}

impl<const N: usize> Default for KeyframeStore<N> {
    fn default() -> Self {
        Self::new()
    }
}
