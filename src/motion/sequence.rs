// SPDX-License-Identifier: GPL-3.0-or-later

// Panoramas and timelapses: a series of blocking moves, each one followed by
// a settle delay and a shutter trigger.

use num::Float;

use crate::consts::sequence::SHUTTER_PULSE_MS;
use crate::drivers::Board;
use crate::drivers::axis::{Axis, AxisSet, StepperDriver};
use crate::errors::{Error, Result};

use super::{KeyframeStore, Pose};

/// The shutter pulse is part of the delay between two shots.
fn settle_delay_ms(delay_ms: u32) -> u32 {
    delay_ms.saturating_sub(SHUTTER_PULSE_MS)
}

fn shoot_at<S: StepperDriver, B: Board>(axes: &mut AxisSet<S>, board: &mut B, pose: &Pose, delay_ms: u32) {
    let targets = pose.to_steps(axes);
    axes.move_to(targets);
    board.delay_ms(settle_delay_ms(delay_ms));
    board.trigger_shutter();
}

/// Number of increments to go from `start` to `stop`, given by the largest
/// of the pan and tilt angles. 0 means there's nothing to do.
pub fn interpolation_increments(start: &Pose, stop: &Pose, deg_per_shot: f64) -> u32 {
    if !(deg_per_shot > 0.0) {
        return 0;
    }
    let pan = stop.pan_deg - start.pan_deg;
    let tilt = stop.tilt_deg - start.tilt_deg;
    let largest = if Float::abs(pan) > Float::abs(tilt) { pan } else { tilt };
    (Float::abs(largest) / deg_per_shot) as u32
}

/// Shoots from `start` to `stop` included, every `deg_per_shot`. Returns the
/// number of increments.
pub fn panorama_between<S: StepperDriver, B: Board>(
    axes: &mut AxisSet<S>,
    board: &mut B,
    start: &Pose,
    stop: &Pose,
    deg_per_shot: f64,
    delay_ms: u32,
) -> u32 {
    let increments = interpolation_increments(start, stop, deg_per_shot);
    if increments == 0 {
        return 0;
    }

    let n = increments as f64;
    for i in 0..=increments {
        let t = i as f64 / n;
        let pose = Pose {
            pan_deg: start.pan_deg + (stop.pan_deg - start.pan_deg) * t,
            tilt_deg: start.tilt_deg + (stop.tilt_deg - start.tilt_deg) * t,
            slider_mm: start.slider_mm + (stop.slider_mm - start.slider_mm) * t,
        };
        shoot_at(axes, board, &pose, delay_ms);
    }

    increments
}

/// Panorama over every pair of consecutive keyframes, `repeat` times.
/// Returns the total number of increments.
pub fn panorama<S: StepperDriver, B: Board, const N: usize>(
    axes: &mut AxisSet<S>,
    store: &KeyframeStore<N>,
    board: &mut B,
    deg_per_shot: f64,
    delay_ms: u32,
    repeat: u32,
) -> Result<u32> {
    if store.len() < 2 {
        return Err(Error::NotEnoughKeyframes);
    }

    let mut increments = 0;
    for _ in 0..repeat {
        for index in 0..store.len() - 1 {
            let (start, stop) = match (store.get(index), store.get(index + 1)) {
                (Some(a), Some(b)) => (Pose::from_steps(axes, a.positions), Pose::from_steps(axes, b.positions)),
                _ => break,
            };
            increments += panorama_between(axes, board, &start, &stop, deg_per_shot, delay_ms);
        }
    }

    info!("Panorama done, {} increments", increments);
    Ok(increments)
}

/// Takes `count + 1` pictures, moving from the current pose by the offset
/// between the first two keyframes, in `count` increments. Without two
/// keyframes, the camera stays in place.
pub fn timelapse<S: StepperDriver, B: Board, const N: usize>(
    axes: &mut AxisSet<S>,
    store: &KeyframeStore<N>,
    board: &mut B,
    count: u32,
    delay_ms: u32,
) -> u32 {
    if count == 0 {
        return 0;
    }

    let start = Pose::from_steps(axes, axes.positions());
    let delta = match (store.get(0), store.get(1)) {
        (Some(a), Some(b)) => {
            let a = Pose::from_steps(axes, a.positions);
            let b = Pose::from_steps(axes, b.positions);
            Pose::new(b.pan_deg - a.pan_deg, b.tilt_deg - a.tilt_deg, b.slider_mm - a.slider_mm)
        }
        _ => Pose::default(),
    };

    for i in 0..=count {
        let t = i as f64 / count as f64;
        let pose = Pose {
            pan_deg: start.get(Axis::Pan) + delta.pan_deg * t,
            tilt_deg: start.get(Axis::Tilt) + delta.tilt_deg * t,
            slider_mm: start.get(Axis::Slider) + delta.slider_mm * t,
        };
        shoot_at(axes, board, &pose, delay_ms);
    }

    info!("Timelapse done, {} pictures", count + 1);
    count + 1
}
