// SPDX-License-Identifier: GPL-3.0-or-later

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Error {
    // Keyframe errors
        CapacityExceeded,
        NoCurrentIndex,
        NotEnoughKeyframes,

    // Homing errors
        /// A required sensor never triggered within its travel bound.
        HomingFailed,
        /// Homing and soft limits are mutually exclusive.
        HomingRefused,

    // Motion errors
        /// The two recorded camera orientations don't point at a usable point.
        NoIntersection,
        LimitViolation,
        InvalidStepMode,
        InvalidArgument,
        /// Confirmed low battery. This one is latched, nothing moves anymore.
        LowBattery,

    // Host and storage errors
        TimedOut,
        UnknownInstruction,
        StorageFailed,
        CorruptSettings,
}
