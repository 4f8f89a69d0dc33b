// SPDX-License-Identifier: GPL-3.0-or-later

mod timeout;
pub use timeout::*;

#[cfg(test)]
pub mod sim;
