// SPDX-License-Identifier: GPL-3.0-or-later

// Software step generation on plain GPIOs. Steps are emitted at constant
// speed, timed against a microsecond clock, so the caller must call the tick
// functions faster than the fastest step rate.

use embedded_hal::digital::v2::OutputPin;
use num::Float;

use crate::drivers::Clock;
use super::{StepperDriver, Steps};

pub struct PulseStepper<STEP, DIR, EN, C> {
    step: STEP,
    dir: DIR,
    enable: EN,
    clock: C,

    position: Steps,
    target: Steps,
    speed: f64,
    max_speed: f64,
    step_interval_us: u64,
    last_step_us: u64,
    inverted: bool,
}

impl<STEP, DIR, EN, C> PulseStepper<STEP, DIR, EN, C>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
    C: Clock,
{
    pub fn new(step: STEP, dir: DIR, enable: EN, clock: C) -> Self {
        let mut self_ = Self {
            step, dir, enable, clock,
            position: Steps(0), target: Steps(0),
            speed: 0.0, max_speed: 1.0,
            step_interval_us: 0, last_step_us: 0,
            inverted: false,
        };
        self_.set_enabled(true);
        self_
    }

    fn do_step(&mut self, forward: bool) {
        // The DIR line is active high for forward travel unless inverted.
        if forward != self.inverted {
            self.dir.set_high().ok();
        } else {
            self.dir.set_low().ok();
        }

        // The drivers latch on the rising edge. The pulse width is given by
        // the time it takes to do the two GPIO writes, which is >1us.
        self.step.set_high().ok();
        self.position.0 += if forward { 1 } else { -1 };
        self.step.set_low().ok();
    }

    fn step_if_due(&mut self, forward: bool) -> bool {
        if self.step_interval_us == 0 {
            return false;
        }

        let now = self.clock.micros();
        if now.wrapping_sub(self.last_step_us) < self.step_interval_us {
            return false;
        }

        self.do_step(forward);
        self.last_step_us = now;
        true
    }
}

impl<STEP, DIR, EN, C> StepperDriver for PulseStepper<STEP, DIR, EN, C>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
    C: Clock,
{
    fn set_target_steps(&mut self, target: Steps) {
        self.target = target;
    }

    fn target_steps(&self) -> Steps {
        self.target
    }

    fn set_max_speed(&mut self, max_speed: f64) {
        self.max_speed = Float::abs(max_speed);
        // Re-clamp
        self.set_speed(self.speed);
    }

    fn max_speed(&self) -> f64 {
        self.max_speed
    }

    fn set_speed(&mut self, speed: f64) {
        let speed = speed.max(-self.max_speed).min(self.max_speed);
        self.speed = speed;
        self.step_interval_us = if speed == 0.0 {
            0
        } else {
            (1_000_000.0 / Float::abs(speed)) as u64
        };
    }

    fn speed(&self) -> f64 {
        self.speed
    }

    fn run_one_tick(&mut self) -> bool {
        let distance = self.distance_to_go().0;
        if distance == 0 {
            return false;
        }
        self.step_if_due(distance > 0);
        true
    }

    fn run_speed_tick(&mut self) -> bool {
        self.step_if_due(self.speed > 0.0)
    }

    fn current_position(&self) -> Steps {
        self.position
    }

    fn set_current_position(&mut self, position: Steps) {
        self.position = position;
        self.target = position;
        self.speed = 0.0;
        self.step_interval_us = 0;
    }

    fn set_direction_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    fn set_enabled(&mut self, enabled: bool) {
        // The A4988/TMC2208 enable input is active low.
        if enabled {
            self.enable.set_low().ok();
        } else {
            self.enable.set_high().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use core::convert::Infallible;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Line(Rc<Cell<bool>>, Rc<Cell<u32>>);

    impl OutputPin for Line {
        type Error = Infallible;
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.set(false);
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            if !self.0.get() {
                self.1.set(self.1.get() + 1);
            }
            self.0.set(true);
            Ok(())
        }
    }

    struct ManualClock(Rc<Cell<u64>>);
    impl Clock for ManualClock {
        fn micros(&self) -> u64 { self.0.get() }
    }

    #[test]
    fn steps_towards_target_at_speed() {
        let now = Rc::new(Cell::new(0));
        let step = Line::default();
        let dir = Line::default();
        let enable = Line::default();
        let mut stepper = PulseStepper::new(step.clone(), dir.clone(), enable.clone(), ManualClock(now.clone()));
        assert!(!enable.0.get());

        stepper.set_max_speed(1000.0);
        stepper.set_speed(5000.0);
        assert_eq!(stepper.speed(), 1000.0);

        stepper.set_target_steps(Steps(-3));
        for t in 1..100 {
            now.set(t * 1000);
            if !stepper.run_one_tick() {
                break;
            }
        }

        assert_eq!(stepper.current_position(), Steps(-3));
        assert_eq!(step.1.get(), 3);
        assert!(!dir.0.get());
        assert!(!stepper.run_one_tick());
    }

    #[test]
    fn no_step_at_zero_speed() {
        let now = Rc::new(Cell::new(0));
        let mut stepper = PulseStepper::new(Line::default(), Line::default(), Line::default(), ManualClock(now.clone()));
        stepper.set_max_speed(100.0);
        stepper.set_target_steps(Steps(10));
        now.set(1_000_000);
        assert!(stepper.run_one_tick());
        assert_eq!(stepper.current_position(), Steps(0));

        stepper.set_current_position(Steps(7));
        assert_eq!(stepper.distance_to_go(), Steps(0));
        assert_eq!(stepper.speed(), 0.0);
    }
}
