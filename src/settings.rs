// SPDX-License-Identifier: GPL-3.0-or-later

// Runtime configuration, persisted in a small EEPROM-like store.
//
// Layout (little endian, ENCODED_LEN bytes):
//   0   magic 'PTM' + version
//   4   step mode divisor (u8)
//   5   inverted axes (u8)
//   6   homing axes (u8)
//   7   flags: bit 0 acceleration, bit 1 soft limits
//   8   max speeds, 3 x f32, deg/s deg/s mm/s
//   20  hall offsets pan/tilt, 2 x f32, deg
//   28  degrees per shot (f32)
//   32  delay between shots (u32, ms)
//   36  ramp increments, 3 x u32, us
//   48  soft limit min, 3 x f32
//   60  soft limit max, 3 x f32

use crate::consts::{motion::*, sequence::*};
use crate::drivers::axis::{Axes, Axis, StepMode};
use crate::errors::{Error, Result};
use crate::motion::AccelRamp;

const MAGIC: [u8; 3] = *b"PTM";
const VERSION: u8 = 1;
pub const ENCODED_LEN: usize = 72;

const FLAG_ACCELERATION: u8 = 1 << 0;
const FLAG_LIMITS: u8 = 1 << 1;

/// Soft limits in units (degrees, mm). Only enforced when enabled.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct SoftLimits {
    pub enabled: bool,
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl SoftLimits {
    pub fn check(&self, axis: Axis, value: f64) -> Result<()> {
        let i = axis.index();
        if self.enabled && (value < self.min[i] || value > self.max[i]) {
            warn!("{:?} target {}{} is outside [{}, {}]", axis, value, axis.unit(), self.min[i], self.max[i]);
            return Err(Error::LimitViolation);
        }
        Ok(())
    }
}

impl Default for SoftLimits {
    fn default() -> Self {
        Self {
            enabled: false,
            min: [-360.0, -90.0, 0.0],
            max: [360.0, 90.0, 1000.0],
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Settings {
    pub step_mode: StepMode,
    /// Units per second.
    pub max_speeds: [f64; 3],
    /// Degrees. Not used for the slider.
    pub hall_offsets: [f64; 3],
    pub inverted: Axes,
    pub homing_mode: Axes,
    pub degrees_per_shot: f64,
    pub delay_between_shots_ms: u32,
    pub acceleration_enabled: bool,
    pub ramp: AccelRamp,
    pub limits: SoftLimits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            step_mode: StepMode::default(),
            max_speeds: [DEFAULT_PAN_MAX_SPEED, DEFAULT_TILT_MAX_SPEED, DEFAULT_SLIDER_MAX_SPEED],
            hall_offsets: [0.0; 3],
            inverted: Axes::empty(),
            homing_mode: Axes::empty(),
            degrees_per_shot: DEFAULT_DEGREES_PER_SHOT,
            delay_between_shots_ms: DEFAULT_DELAY_BETWEEN_SHOTS_MS,
            acceleration_enabled: false,
            ramp: AccelRamp::default(),
            limits: SoftLimits::default(),
        }
    }
}

/// A small non-volatile byte store.
pub trait SettingsStorage {
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;
    fn write(&mut self, data: &[u8]) -> Result<()>;
}

struct Writer<'a> {
    buf: &'a mut [u8; ENCODED_LEN],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn bytes(&mut self, data: &[u8]) {
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    fn u8(&mut self, v: u8) { self.bytes(&[v]) }
    fn u32(&mut self, v: u32) { self.bytes(&v.to_le_bytes()) }
    fn f32(&mut self, v: f64) { self.bytes(&(v as f32).to_le_bytes()) }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0; N];
        let src = self.buf.get(self.pos..self.pos + N).ok_or(Error::CorruptSettings)?;
        out.copy_from_slice(src);
        self.pos += N;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> { Ok(self.bytes::<1>()?[0]) }
    fn u32(&mut self) -> Result<u32> { Ok(u32::from_le_bytes(self.bytes()?)) }

    fn f32(&mut self) -> Result<f64> {
        let v = f32::from_le_bytes(self.bytes()?);
        if !v.is_finite() {
            return Err(Error::CorruptSettings);
        }
        Ok(v as f64)
    }

    fn axes(&mut self) -> Result<Axes> {
        Axes::from_bits(self.u8()?).ok_or(Error::CorruptSettings)
    }
}

impl Settings {
    pub fn encode(&self) -> [u8; ENCODED_LEN] {
        let mut buf = [0; ENCODED_LEN];
        let mut w = Writer { buf: &mut buf, pos: 0 };

        w.bytes(&MAGIC);
        w.u8(VERSION);
        w.u8(self.step_mode.divisor() as u8);
        w.u8(self.inverted.bits());
        w.u8(self.homing_mode.bits());

        let mut flags = 0;
        if self.acceleration_enabled { flags |= FLAG_ACCELERATION; }
        if self.limits.enabled { flags |= FLAG_LIMITS; }
        w.u8(flags);

        self.max_speeds.iter().for_each(|v| w.f32(*v));
        w.f32(self.hall_offsets[Axis::Pan.index()]);
        w.f32(self.hall_offsets[Axis::Tilt.index()]);
        w.f32(self.degrees_per_shot);
        w.u32(self.delay_between_shots_ms);
        self.ramp.increment_us.iter().for_each(|v| w.u32(*v));
        self.limits.min.iter().for_each(|v| w.f32(*v));
        self.limits.max.iter().for_each(|v| w.f32(*v));

        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = Reader { buf, pos: 0 };

        if r.bytes::<3>()? != MAGIC || r.u8()? != VERSION {
            return Err(Error::CorruptSettings);
        }

        let step_mode = StepMode::from_divisor(r.u8()? as u32).ok_or(Error::CorruptSettings)?;
        let inverted = r.axes()?;
        let homing_mode = r.axes()?;
        let flags = r.u8()?;

        let max_speeds = [r.f32()?, r.f32()?, r.f32()?];
        let hall_offsets = [r.f32()?, r.f32()?, 0.0];
        let degrees_per_shot = r.f32()?;
        let delay_between_shots_ms = r.u32()?;
        let ramp = AccelRamp { increment_us: [r.u32()?, r.u32()?, r.u32()?] };
        let min = [r.f32()?, r.f32()?, r.f32()?];
        let max = [r.f32()?, r.f32()?, r.f32()?];

        Ok(Self {
            step_mode,
            max_speeds,
            hall_offsets,
            inverted,
            homing_mode,
            degrees_per_shot,
            delay_between_shots_ms,
            acceleration_enabled: flags & FLAG_ACCELERATION != 0,
            ramp,
            limits: SoftLimits { enabled: flags & FLAG_LIMITS != 0, min, max },
        })
    }

    /// Never fails: unreadable or invalid storage gives the defaults.
    pub fn load(storage: &mut impl SettingsStorage) -> Self {
        let mut buf = [0; ENCODED_LEN];
        match storage.read(&mut buf).and_then(|_| Self::decode(&buf)) {
            Ok(settings) => {
                info!("Settings loaded");
                settings
            }
            Err(e) => {
                warn!("Settings not loaded ({:?}), using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, storage: &mut impl SettingsStorage) -> Result<()> {
        storage.write(&self.encode())?;
        info!("Settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Eeprom {
        data: [u8; 128],
        fail: bool,
    }

    impl SettingsStorage for Eeprom {
        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            if self.fail {
                return Err(Error::StorageFailed);
            }
            buf.copy_from_slice(&self.data[..buf.len()]);
            Ok(())
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            if self.fail {
                return Err(Error::StorageFailed);
            }
            self.data[..data.len()].copy_from_slice(data);
            Ok(())
        }
    }

    #[test]
    fn save_then_load() {
        let mut settings = Settings::default();
        settings.step_mode = StepMode::Quarter;
        settings.max_speeds = [20.0, 30.0, 12.5];
        settings.hall_offsets = [1.5, -2.25, 0.0];
        settings.inverted = Axes::TILT;
        settings.homing_mode = Axes::all();
        settings.acceleration_enabled = true;
        settings.limits.enabled = true;

        let mut eeprom = Eeprom { data: [0xff; 128], fail: false };
        settings.save(&mut eeprom).unwrap();
        assert_eq!(Settings::load(&mut eeprom), settings);
    }

    #[test]
    fn blank_storage_gives_defaults() {
        let mut eeprom = Eeprom { data: [0xff; 128], fail: false };
        assert_eq!(Settings::load(&mut eeprom), Settings::default());

        let mut eeprom = Eeprom { data: [0; 128], fail: true };
        assert_eq!(Settings::load(&mut eeprom), Settings::default());
        assert_eq!(Settings::default().save(&mut eeprom), Err(Error::StorageFailed));
    }

    #[test]
    fn rejects_bad_values() {
        let mut buf = Settings::default().encode();
        buf[4] = 3;
        assert_eq!(Settings::decode(&buf), Err(Error::CorruptSettings));

        let mut buf = Settings::default().encode();
        buf[8..12].copy_from_slice(&f32::NAN.to_le_bytes());
        assert_eq!(Settings::decode(&buf), Err(Error::CorruptSettings));

        let buf = Settings::default().encode();
        assert_eq!(Settings::decode(&buf[..40]), Err(Error::CorruptSettings));
    }

    #[test]
    fn soft_limits() {
        let mut limits = SoftLimits::default();
        assert_eq!(limits.check(Axis::Tilt, 120.0), Ok(()));
        limits.enabled = true;
        assert_eq!(limits.check(Axis::Tilt, 120.0), Err(Error::LimitViolation));
        assert_eq!(limits.check(Axis::Slider, 500.0), Ok(()));
    }
}
