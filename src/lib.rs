// SPDX-License-Identifier: GPL-3.0-or-later

#![cfg_attr(not(test), no_std)]
// Tests build with std, whose inherent float methods shadow num::Float.
#![cfg_attr(test, allow(unused_imports))]

#[macro_use]
extern crate log;

pub mod consts;
pub mod errors;
#[cfg(feature = "rtt")]
pub mod logging;

pub mod drivers;
pub mod motion;
pub mod settings;
pub mod protocol;
pub mod controller;
pub mod util;

pub use controller::MotionController;
pub use errors::{Error, Result};
