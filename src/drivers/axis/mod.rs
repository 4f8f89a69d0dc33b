// SPDX-License-Identifier: GPL-3.0-or-later

mod distance;
pub use distance::*;

mod stepper;
pub use stepper::*;

mod pulse_stepper;
pub use pulse_stepper::*;

mod axis_set;
pub use axis_set::*;
