// SPDX-License-Identifier: GPL-3.0-or-later

pub mod axis;

mod board;
pub use board::*;
