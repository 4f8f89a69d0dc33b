// SPDX-License-Identifier: GPL-3.0-or-later

use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::digital::v2::{InputPin, OutputPin};

use crate::consts::sequence::SHUTTER_PULSE_MS;
use super::axis::Axis;

/// Free running microsecond counter.
pub trait Clock {
    fn micros(&self) -> u64;
}

impl<T: Clock> Clock for &T {
    fn micros(&self) -> u64 {
        (*self).micros()
    }
}

pub trait BatteryMonitor {
    fn read_volts(&mut self) -> f32;
}

impl<F: FnMut() -> f32> BatteryMonitor for F {
    fn read_volts(&mut self) -> f32 {
        self()
    }
}

/// Everything the motion code needs from the hardware, besides the steppers.
pub trait Board {
    fn delay_ms(&mut self, ms: u32);
    fn delay_us(&mut self, us: u32);
    fn micros(&self) -> u64;
    /// False when the axis has no sensor.
    fn home_sensor_active(&mut self, axis: Axis) -> bool;
    /// Blocks for the duration of the pulse.
    fn trigger_shutter(&mut self);
    fn battery_voltage(&mut self) -> f32;
}

pub struct HalBoard<D, C, P, SH, B> {
    delay: D,
    clock: C,
    // Indexed by Axis::index()
    sensors: [Option<P>; 3],
    shutter: SH,
    battery: B,
}

impl<D, C, P, SH, B> HalBoard<D, C, P, SH, B>
where
    D: DelayMs<u32> + DelayUs<u32>,
    C: Clock,
    P: InputPin,
    SH: OutputPin,
    B: BatteryMonitor,
{
    pub fn new(delay: D, clock: C, sensors: [Option<P>; 3], mut shutter: SH, battery: B) -> Self {
        shutter.set_low().ok();
        Self { delay, clock, sensors, shutter, battery }
    }
}

impl<D, C, P, SH, B> Board for HalBoard<D, C, P, SH, B>
where
    D: DelayMs<u32> + DelayUs<u32>,
    C: Clock,
    P: InputPin,
    SH: OutputPin,
    B: BatteryMonitor,
{
    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    fn micros(&self) -> u64 {
        self.clock.micros()
    }

    fn home_sensor_active(&mut self, axis: Axis) -> bool {
        // The hall sensors pull the line low when a magnet is in front.
        self.sensors[axis.index()].as_ref()
            .map(|pin| pin.is_low().unwrap_or(false))
            .unwrap_or(false)
    }

    fn trigger_shutter(&mut self) {
        self.shutter.set_high().ok();
        self.delay.delay_ms(SHUTTER_PULSE_MS);
        self.shutter.set_low().ok();
    }

    fn battery_voltage(&mut self) -> f32 {
        self.battery.read_volts()
    }
}
