// SPDX-License-Identifier: GPL-3.0-or-later

pub mod hardware {
    pub const FULL_STEPS_PER_REVOLUTION: f64 = 200.0;
    // 144/17 teeth
    pub const PAN_GEAR_RATIO: f64 = 144.0 / 17.0;
    // 123/16 teeth, belt driven tilt axis.
    pub const TILT_GEAR_RATIO: f64 = 123.0 / 16.0;
    pub const SLIDER_PULLEY_TEETH: f64 = 36.0;
    pub const SLIDER_BELT_PITCH_MM: f64 = 2.0;
}

pub mod motion {
    // Defaults, in degrees/s for pan and tilt, mm/s for the slider.
    pub const DEFAULT_PAN_MAX_SPEED: f64 = 15.0;
    pub const DEFAULT_TILT_MAX_SPEED: f64 = 45.0;
    pub const DEFAULT_SLIDER_MAX_SPEED: f64 = 15.0;
}

pub mod accel_ramp {
    // Time between two 1% speed increments, per axis.
    pub const DEFAULT_PAN_INCREMENT_US: u32 = 4000;
    pub const DEFAULT_TILT_INCREMENT_US: u32 = 3000;
    pub const DEFAULT_SLIDER_INCREMENT_US: u32 = 3500;

    // These were fitted on the real mount. They do not correspond to any
    // physical acceleration in steps/s^2.
    pub const INCREMENT_US_TO_SECONDS: f64 = 0.0001;
    pub const DECELERATION_DISTANCE_DIVISOR: f64 = 5.0;
    pub const STOP_DELTA_FACTOR: f64 = 2.0;

    pub const RAMP_PERCENT_STEPS: u32 = 100;
}

pub mod keyframes {
    pub const CAPACITY: usize = 35;
}

pub mod homing {
    // Jog increments used to move off a sensor that is already active at start.
    pub const ROTARY_JOG_DEGREES: f64 = 1.0;
    pub const SLIDER_JOG_MM: f64 = 0.1;

    // If we jogged that much and the sensor is still active, it's stuck.
    pub const ROTARY_RUNAWAY_DEGREES: f64 = 360.0;
    pub const SLIDER_RUNAWAY_MM: f64 = 1000.0;

    // First sweep, towards negative positions.
    pub const ROTARY_COARSE_DEGREES: f64 = -45.0;
    // About the length of the slider.
    pub const SLIDER_COARSE_MM: f64 = -1000.0;

    // Second sweep, for the axes that did not trigger. A full rotation in the
    // other direction, so it must pass the sensor.
    pub const ROTARY_FINE_SWEEP_DEGREES: f64 = 360.0;
}

pub mod sequence {
    // Camera shutter pulse length.
    pub const SHUTTER_PULSE_MS: u32 = 200;
    pub const DEFAULT_DEGREES_PER_SHOT: f64 = 0.5;
    pub const DEFAULT_DELAY_BETWEEN_SHOTS_MS: u32 = 1000;
    // Orbit mode re-aims the camera every millimetre of slider travel.
    pub const ORBIT_INCREMENT_MM: f64 = 1.0;
}

pub mod battery {
    // 9.5V leaves some room for inaccurate readings.
    pub const CUTOFF_VOLTAGE: f32 = 9.5;
    pub const RECHECK_DELAY_MS: u32 = 200;
}

pub mod protocol {
    pub const MAX_ARGUMENT_LENGTH: usize = 10;
    // We wait ~20ms for the 6 bytes of a speed payload before giving up.
    pub const PAYLOAD_POLL_ATTEMPTS: u32 = 100;
    pub const PAYLOAD_POLL_DELAY_US: u32 = 200;
    // Numeric arguments are done when the line is idle for 2ms.
    pub const ARGUMENT_IDLE_ATTEMPTS: u32 = 10;
    pub const ARGUMENT_POLL_DELAY_US: u32 = 200;
    // The bluetooth module banner comes in pieces, we let it all arrive.
    pub const BANNER_DRAIN_MS: u32 = 100;
    // Upper bound of bytes discarded when flushing.
    pub const MAX_FLUSH_BYTES: u32 = 256;
}
