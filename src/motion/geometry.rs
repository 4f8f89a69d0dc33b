// SPDX-License-Identifier: GPL-3.0-or-later

// Orbit mode. The slider runs along the x axis, y is the horizontal distance
// away from the slider, z is the height. Pan 0 points along +x, and pan 90
// degrees points along +y.
//
// From two recorded poses looking at the same subject, we intersect the two
// pan rays in the horizontal plane, and get the height from the tilt of the
// first pose. Then we can re-aim at that point from any slider position.

use num::Float;

use crate::consts::sequence::ORBIT_INCREMENT_MM;
use crate::drivers::axis::{Axis, AxisSet, StepperDriver, Steps};
use crate::errors::{Error, Result};

const EPSILON: f64 = 1e-9;

#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Pose {
    pub pan_deg: f64,
    pub tilt_deg: f64,
    pub slider_mm: f64,
}

impl Pose {
    pub fn new(pan_deg: f64, tilt_deg: f64, slider_mm: f64) -> Self {
        Self { pan_deg, tilt_deg, slider_mm }
    }

    pub fn from_steps<S: StepperDriver>(axes: &AxisSet<S>, steps: [Steps; 3]) -> Self {
        Self {
            pan_deg: axes.to_units(Axis::Pan, steps[Axis::Pan.index()]),
            tilt_deg: axes.to_units(Axis::Tilt, steps[Axis::Tilt.index()]),
            slider_mm: axes.to_units(Axis::Slider, steps[Axis::Slider.index()]),
        }
    }

    pub fn to_steps<S: StepperDriver>(&self, axes: &AxisSet<S>) -> [Steps; 3] {
        [
            axes.to_steps(Axis::Pan, self.pan_deg),
            axes.to_steps(Axis::Tilt, self.tilt_deg),
            axes.to_steps(Axis::Slider, self.slider_mm),
        ]
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Pan => self.pan_deg,
            Axis::Tilt => self.tilt_deg,
            Axis::Slider => self.slider_mm,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct TargetPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

// y = m*x + c, or x = c when vertical.
#[derive(Debug, Clone, Copy)]
enum Line {
    Sloped { m: f64, c: f64 },
    Vertical { x: f64 },
}

impl Line {
    fn from_ray(slider_mm: f64, pan_deg: f64) -> Self {
        let angle = pan_deg.to_radians();
        let (x0, y0) = (slider_mm, 0.0);
        let (x1, y1) = (slider_mm + angle.cos(), angle.sin());

        if (x1 - x0).abs() < EPSILON {
            Line::Vertical { x: x0 }
        } else {
            let m = (y1 - y0) / (x1 - x0);
            Line::Sloped { m, c: y1 - m * x1 }
        }
    }

    fn intersect(self, other: Line) -> Option<(f64, f64)> {
        match (self, other) {
            (Line::Vertical { .. }, Line::Vertical { .. }) => None,
            (Line::Vertical { x }, Line::Sloped { m, c }) |
            (Line::Sloped { m, c }, Line::Vertical { x }) => Some((x, m * x + c)),
            (Line::Sloped { m: m1, c: c1 }, Line::Sloped { m: m2, c: c2 }) => {
                if (m1 - m2).abs() < EPSILON {
                    return None;
                }
                let x = (c2 - c1) / (m1 - m2);
                Some((x, m1 * x + c1))
            }
        }
    }
}

pub fn calculate_target_coordinate(p0: &Pose, p1: &Pose) -> Result<TargetPoint> {
    let line0 = Line::from_ray(p0.slider_mm, p0.pan_deg);
    let line1 = Line::from_ray(p1.slider_mm, p1.pan_deg);

    let (x, y) = line0.intersect(line1).ok_or_else(|| {
        warn!("Orbit: the two poses do not intersect");
        Error::NoIntersection
    })?;

    // The point must be on the side the camera was looking at.
    let behind = (p0.pan_deg > 0.0 && p1.pan_deg > 0.0 && y < 0.0) ||
                 (p0.pan_deg < 0.0 && p1.pan_deg < 0.0 && y > 0.0) ||
                 y.abs() < EPSILON;
    if behind {
        warn!("Orbit: invalid intersection at x={} y={}", x, y);
        return Err(Error::NoIntersection);
    }

    let dx = x - p0.slider_mm;
    let z = p0.tilt_deg.to_radians().tan() * (dx * dx + y * y).sqrt();

    debug!("Orbit: target at x={} y={} z={}", x, y, z);
    Ok(TargetPoint { x, y, z })
}

impl TargetPoint {
    /// Pan and tilt that center the point when the slider is at `slider_mm`.
    pub fn aim_from(&self, slider_mm: f64) -> Pose {
        let dx = self.x - slider_mm;
        let horizontal = (dx * dx + self.y * self.y).sqrt();
        Pose {
            pan_deg: self.y.atan2(dx).to_degrees(),
            tilt_deg: self.z.atan2(horizontal).to_degrees(),
            slider_mm,
        }
    }

    /// Sweeps the slider from `start_mm` to `end_mm` in ~1mm increments,
    /// re-aiming at the point at each increment. With `repeat == 0`, a single
    /// one way sweep. Otherwise `repeat` round trips. Returns the number of
    /// moves done.
    pub fn interpolate<S: StepperDriver>(
        &self,
        axes: &mut AxisSet<S>,
        start_mm: f64,
        end_mm: f64,
        repeat: u32,
    ) -> u32 {
        let travel = end_mm - start_mm;
        let increments = (travel.abs() / ORBIT_INCREMENT_MM) as u32;
        let increment = if increments == 0 { 0.0 } else { travel / increments as f64 };
        let slider_at = |i: u32| start_mm + increment * i as f64;

        let mut moves = 0;
        let mut aim = |axes: &mut AxisSet<S>, slider_mm: f64| {
            let targets = self.aim_from(slider_mm).to_steps(axes);
            axes.move_to(targets);
            moves += 1;
        };

        for _ in 0..repeat.max(1) {
            for i in 0..=increments {
                aim(axes, slider_at(i));
            }
            aim(axes, end_mm);

            if repeat > 0 {
                for i in (0..=increments).rev() {
                    aim(axes, slider_at(i));
                }
                aim(axes, start_mm);
            }
        }

        moves
    }
}
