// SPDX-License-Identifier: GPL-3.0-or-later

mod sync_mover;
pub use sync_mover::*;

mod keyframes;
pub use keyframes::*;

mod accel_ramp;
pub use accel_ramp::*;

pub mod homing;
pub use homing::{HomingEngine, HomingState};

mod geometry;
pub use geometry::*;

pub mod sequence;
