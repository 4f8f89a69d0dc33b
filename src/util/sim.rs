// SPDX-License-Identifier: GPL-3.0-or-later

// Simulated hardware for the unit tests. Time is virtual: every stepper tick
// and every clock read is TICK_US long, so the tests are deterministic and
// don't depend on how fast the host runs.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::rc::Rc;
use std::vec::Vec;

use crate::drivers::{Board, axis::{Axis, AxisSet, StepMode, StepperDriver, Steps}};

pub const TICK_US: u64 = 100;

pub struct SimStepper {
    // Logical position, redefined by set_current_position().
    position: i64,
    // Where the motor really is. Only steps change it.
    physical: Rc<Cell<i64>>,
    target: Steps,
    speed: f64,
    max_speed: f64,
    // Fraction of a step accumulated since the last step.
    phase: f64,
    pub inverted: bool,
    pub enabled: bool,
}

impl SimStepper {
    pub fn new() -> Self {
        Self {
            position: 0,
            physical: Rc::new(Cell::new(0)),
            target: Steps(0),
            speed: 0.0,
            max_speed: 1.0,
            phase: 0.0,
            inverted: false,
            enabled: true,
        }
    }

    /// Shared view of the physical position, for sensors and assertions.
    pub fn position_cell(&self) -> Rc<Cell<i64>> {
        self.physical.clone()
    }

    fn tick(&mut self, forward: bool) -> bool {
        self.phase += self.speed.abs() * TICK_US as f64 / 1_000_000.0;
        if self.phase < 1.0 {
            return false;
        }
        self.phase -= 1.0;
        let step = if forward { 1 } else { -1 };
        self.position += step;
        self.physical.set(self.physical.get() + step);
        true
    }
}

impl StepperDriver for SimStepper {
    fn set_target_steps(&mut self, target: Steps) {
        self.target = target;
    }

    fn target_steps(&self) -> Steps {
        self.target
    }

    fn set_max_speed(&mut self, max_speed: f64) {
        self.max_speed = max_speed.abs();
        self.speed = self.speed.max(-self.max_speed).min(self.max_speed);
    }

    fn max_speed(&self) -> f64 {
        self.max_speed
    }

    fn set_speed(&mut self, speed: f64) {
        self.speed = speed.max(-self.max_speed).min(self.max_speed);
    }

    fn speed(&self) -> f64 {
        self.speed
    }

    fn run_one_tick(&mut self) -> bool {
        let distance = self.distance_to_go().0;
        if distance == 0 {
            return false;
        }
        self.tick(distance > 0);
        true
    }

    fn run_speed_tick(&mut self) -> bool {
        self.tick(self.speed > 0.0)
    }

    fn current_position(&self) -> Steps {
        Steps(self.position)
    }

    fn set_current_position(&mut self, position: Steps) {
        self.position = position.0;
        self.target = position;
        self.speed = 0.0;
        self.phase = 0.0;
    }

    fn set_direction_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

pub fn sim_axes() -> AxisSet<SimStepper> {
    let mut axes = AxisSet::new(SimStepper::new(), SimStepper::new(), SimStepper::new(), StepMode::Sixteenth);
    axes.set_max_speed_units(Axis::Pan, 15.0);
    axes.set_max_speed_units(Axis::Tilt, 45.0);
    axes.set_max_speed_units(Axis::Slider, 15.0);
    axes
}

struct SimSensor {
    position: Rc<Cell<i64>>,
    active_window: RangeInclusive<i64>,
}

pub struct SimBoard {
    now_us: Cell<u64>,
    pub delays_ms: Vec<u32>,
    pub shutter_count: u32,
    /// Physical pose of the watched axes at each shutter trigger.
    pub shots: Vec<[i64; 3]>,
    watched: [Option<Rc<Cell<i64>>>; 3],
    sensors: [Option<SimSensor>; 3],
    sensor_reads: RefCell<[u32; 3]>,
    voltages: VecDeque<f32>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            now_us: Cell::new(0),
            delays_ms: Vec::new(),
            shutter_count: 0,
            shots: Vec::new(),
            watched: [None, None, None],
            sensors: [None, None, None],
            sensor_reads: RefCell::new([0; 3]),
            voltages: VecDeque::new(),
        }
    }

    /// The home sensor of `axis` is active while the axis is within `window`.
    pub fn with_sensor(mut self, axis: Axis, position: Rc<Cell<i64>>, active_window: RangeInclusive<i64>) -> Self {
        self.sensors[axis.index()] = Some(SimSensor { position, active_window });
        self
    }

    /// Records the pose of `axes` at each shutter trigger.
    pub fn watching(mut self, axes: &AxisSet<SimStepper>) -> Self {
        for axis in Axis::ALL {
            self.watched[axis.index()] = Some(axes.driver(axis).position_cell());
        }
        self
    }

    /// Voltages returned by successive reads. Once drained, reads return 12V.
    pub fn with_voltages(mut self, voltages: &[f32]) -> Self {
        self.voltages.extend(voltages.iter().copied());
        self
    }

    pub fn now_us(&self) -> u64 {
        self.now_us.get()
    }

    pub fn sensor_reads(&self, axis: Axis) -> u32 {
        self.sensor_reads.borrow()[axis.index()]
    }

    pub fn total_delay_ms(&self) -> u32 {
        self.delays_ms.iter().sum()
    }
}

impl Board for SimBoard {
    fn delay_ms(&mut self, ms: u32) {
        self.delays_ms.push(ms);
        self.now_us.set(self.now_us.get() + ms as u64 * 1000);
    }

    fn delay_us(&mut self, us: u32) {
        self.now_us.set(self.now_us.get() + us as u64);
    }

    fn micros(&self) -> u64 {
        let now = self.now_us.get() + TICK_US;
        self.now_us.set(now);
        now
    }

    fn home_sensor_active(&mut self, axis: Axis) -> bool {
        self.sensor_reads.borrow_mut()[axis.index()] += 1;
        self.sensors[axis.index()].as_ref()
            .map(|s| s.active_window.contains(&s.position.get()))
            .unwrap_or(false)
    }

    fn trigger_shutter(&mut self) {
        self.shutter_count += 1;
        let pose = self.watched.clone().map(|cell| cell.map(|c| c.get()).unwrap_or(0));
        self.shots.push(pose);
        self.delay_ms(crate::consts::sequence::SHUTTER_PULSE_MS);
    }

    fn battery_voltage(&mut self) -> f32 {
        self.voltages.pop_front().unwrap_or(12.0)
    }
}
