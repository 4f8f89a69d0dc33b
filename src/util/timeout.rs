// SPDX-License-Identifier: GPL-3.0-or-later

use crate::drivers::Board;
use crate::errors::{Error, Result};

/// Polls a non-blocking operation up to `attempts` times, waiting `delay_us`
/// between polls. Errors reported by the operation count as a failed attempt,
/// like `WouldBlock`.
pub fn retry_with_timeout<T, E>(
    board: &mut impl Board,
    attempts: u32,
    delay_us: u32,
    mut op: impl FnMut() -> nb::Result<T, E>,
) -> Result<T> {
    for attempt in 0..attempts {
        if attempt > 0 {
            board.delay_us(delay_us);
        }
        match op() {
            Ok(v) => return Ok(v),
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(_)) => {}
        }
    }
    Err(Error::TimedOut)
}
