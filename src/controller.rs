// SPDX-License-Identifier: GPL-3.0-or-later

use embedded_hal::serial;

use crate::consts::{battery::*, keyframes::CAPACITY};
use crate::drivers::Board;
use crate::drivers::axis::{Axes, Axis, AxisSet, StepMode, StepperDriver};
use crate::errors::{Error, Result};
use crate::motion::{
    calculate_target_coordinate, sequence, HomingEngine, Keyframe, KeyframeStore, Pose, TargetPoint,
};
use crate::protocol::{Instruction, InstructionReader};
use crate::settings::{Settings, SettingsStorage};

/// Owns the axes, the recorded keyframes and the configuration. Everything
/// runs on the caller's thread and blocks until done.
pub struct MotionController<S, const N: usize = CAPACITY> {
    axes: AxisSet<S>,
    keyframes: KeyframeStore<N>,
    settings: Settings,
    enabled: bool,
    // Set on a confirmed low battery. Never cleared.
    halted: bool,
    // Joystick speeds are applied on every main loop round.
    speed_run: bool,
}

impl<S: StepperDriver, const N: usize> MotionController<S, N> {
    pub fn new(pan: S, tilt: S, slider: S, settings: Settings) -> Self {
        let mut axes = AxisSet::new(pan, tilt, slider, settings.step_mode);
        axes.set_inverted(settings.inverted);
        axes.set_enabled(true);

        let mut controller = Self {
            axes,
            keyframes: KeyframeStore::new(),
            settings,
            enabled: true,
            halted: false,
            speed_run: false,
        };
        controller.apply_max_speeds();
        controller
    }

    pub fn axes(&self) -> &AxisSet<S> {
        &self.axes
    }

    pub fn keyframes(&self) -> &KeyframeStore<N> {
        &self.keyframes
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn ensure_running(&self) -> Result<()> {
        if self.halted {
            return Err(Error::LowBattery);
        }
        Ok(())
    }

    fn apply_max_speeds(&mut self) {
        for axis in Axis::ALL {
            self.axes.set_max_speed_units(axis, self.settings.max_speeds[axis.index()]);
        }
    }

    //--------------------------
    //  Playback
    //--------------------------

    /// Moves to keyframe `index` and waits for its dwell. An index out of
    /// range does nothing.
    pub fn play<B: Board>(&mut self, index: usize, board: &mut B) -> Result<()> {
        self.ensure_running()?;

        let keyframe = match self.keyframes.get(index) {
            Some(keyframe) => *keyframe,
            None => {
                debug!("No keyframe at index {}", index);
                return Ok(());
            }
        };

        if self.settings.acceleration_enabled {
            self.settings.ramp.move_to_keyframe(&mut self.axes, &self.keyframes, index, board);
        } else {
            self.axes.set_max_speeds(keyframe.speeds);
            self.axes.move_to(keyframe.positions);
        }

        if keyframe.dwell_ms > 0 {
            board.delay_ms(keyframe.dwell_ms);
        }

        self.keyframes.set_current_index(index);
        debug!("Index: {}", index);
        Ok(())
    }

    /// Plays every keyframe in order, `repeat` times. The battery is checked
    /// after each pass.
    pub fn play_all<B: Board>(&mut self, repeat: u32, board: &mut B) -> Result<()> {
        self.ensure_running()?;
        self.axes.set_speeds([0.0; 3]);

        for _ in 0..repeat {
            for index in 0..self.keyframes.len() {
                self.play(index, board)?;
            }
            self.check_battery(board)?;
        }

        info!("Played {} keyframes {} times", self.keyframes.len(), repeat);
        Ok(())
    }

    fn check_battery<B: Board>(&mut self, board: &mut B) -> Result<()> {
        if board.battery_voltage() >= CUTOFF_VOLTAGE {
            return Ok(());
        }

        // A single low reading can be noise.
        board.delay_ms(RECHECK_DELAY_MS);
        let volts = board.battery_voltage();
        if volts >= CUTOFF_VOLTAGE {
            return Ok(());
        }

        error!("Battery low ({}V), halting", volts);
        self.halted = true;
        Err(Error::LowBattery)
    }

    pub fn goto_first<B: Board>(&mut self, board: &mut B) -> Result<()> {
        self.play(0, board)
    }

    pub fn goto_last<B: Board>(&mut self, board: &mut B) -> Result<()> {
        match self.keyframes.len().checked_sub(1) {
            Some(last) => self.play(last, board),
            None => Ok(()),
        }
    }

    pub fn step_forward<B: Board>(&mut self, board: &mut B) -> Result<()> {
        let next = self.keyframes.current_index().map_or(0, |i| i + 1);
        self.play(next, board)
    }

    pub fn step_backward<B: Board>(&mut self, board: &mut B) -> Result<()> {
        match self.keyframes.current_index().and_then(|i| i.checked_sub(1)) {
            Some(previous) => self.play(previous, board),
            None => Ok(()),
        }
    }

    //--------------------------
    //  Recording
    //--------------------------

    pub fn add_keyframe(&mut self) -> Result<usize> {
        let index = self.keyframes.add(Keyframe::capture(&self.axes))?;
        info!("Added keyframe {}", index);
        Ok(index)
    }

    pub fn add_keyframe_with_dwell(&mut self, dwell_ms: u32) -> Result<usize> {
        self.add_keyframe()?;
        self.set_dwell(dwell_ms)
    }

    /// Replaces the current keyframe with the live pose and speeds.
    pub fn edit_keyframe(&mut self) -> Result<usize> {
        let index = self.keyframes.edit_current(Keyframe::capture(&self.axes))?;
        info!("Edited keyframe {}", index);
        Ok(index)
    }

    pub fn set_dwell(&mut self, dwell_ms: u32) -> Result<usize> {
        let index = self.keyframes.set_dwell(dwell_ms)?;
        info!("{}ms dwell at keyframe {}", dwell_ms, index);
        Ok(index)
    }

    pub fn clear_keyframes(&mut self) {
        self.keyframes.clear();
        info!("Keyframes cleared");
    }

    pub fn scale_speeds(&mut self, factor: f64) -> Result<()> {
        self.keyframes.scale_speeds(factor)?;
        info!("Keyframe speeds scaled by {}", factor);
        Ok(())
    }

    //--------------------------
    //  Direct moves
    //--------------------------

    /// Blocking synchronized move to a pose in degrees and mm.
    pub fn move_to_units(&mut self, pose: Pose) -> Result<()> {
        self.ensure_running()?;
        for axis in Axis::ALL {
            self.settings.limits.check(axis, pose.get(axis))?;
        }
        let targets = pose.to_steps(&self.axes);
        self.axes.move_to(targets);
        Ok(())
    }

    /// Moves a single axis, the others stay where they are.
    pub fn move_axis(&mut self, axis: Axis, units: f64) -> Result<()> {
        self.ensure_running()?;
        self.settings.limits.check(axis, units)?;
        let mut targets = self.axes.positions();
        targets[axis.index()] = self.axes.to_steps(axis, units);
        self.axes.move_to(targets);
        Ok(())
    }

    pub fn pan_to(&mut self, degrees: f64) -> Result<()> {
        self.move_axis(Axis::Pan, degrees)
    }

    pub fn tilt_to(&mut self, degrees: f64) -> Result<()> {
        self.move_axis(Axis::Tilt, degrees)
    }

    pub fn slider_to(&mut self, mm: f64) -> Result<()> {
        self.move_axis(Axis::Slider, mm)
    }

    /// Joystick control. Sets the speeds (steps/s), which the main loop
    /// keeps running until all of them are 0 or another instruction comes in.
    pub fn run_speeds(&mut self, speeds: [i16; 3]) -> Result<()> {
        self.ensure_running()?;
        self.axes.set_speeds(speeds.map(f64::from));
        self.speed_run = speeds.iter().any(|s| *s != 0);
        self.axes.run_free();
        Ok(())
    }

    /// Declares the current pose as home.
    pub fn set_home(&mut self) {
        for axis in Axis::ALL {
            self.axes.zero(axis);
        }
        info!("Home set");
    }

    /// Homes the axes of the homing mode. On failure, the current pose is
    /// taken as home.
    pub fn home<B: Board>(&mut self, board: &mut B) -> Result<Axes> {
        self.ensure_running()?;
        if self.settings.limits.enabled {
            warn!("Homing refused, soft limits are enabled");
            return Err(Error::HomingRefused);
        }

        let mut homing = HomingEngine::new(self.settings.homing_mode, self.settings.hall_offsets);
        match homing.run(&mut self.axes, board) {
            Ok(homed) => Ok(homed),
            Err(e) => {
                self.set_home();
                error!("Error homing, using the current pose as home");
                Err(e)
            }
        }
    }

    //--------------------------
    //  Configuration
    //--------------------------

    /// Positions, keyframes and speeds are rescaled to keep their meaning.
    pub fn set_step_mode(&mut self, divisor: u32) -> Result<()> {
        self.ensure_running()?;
        let step_mode = StepMode::from_divisor(divisor).ok_or_else(|| {
            warn!("Invalid step mode {}", divisor);
            Error::InvalidStepMode
        })?;

        let ratio = self.axes.set_step_mode(step_mode);
        self.keyframes.rescale(ratio);
        self.settings.step_mode = step_mode;
        self.apply_max_speeds();

        info!("Step mode 1/{}", step_mode.divisor());
        Ok(())
    }

    /// `max_speed` is in units/s.
    pub fn set_max_speed(&mut self, axis: Axis, max_speed: f64) -> Result<()> {
        if !(max_speed >= 0.0) || !max_speed.is_finite() {
            return Err(Error::InvalidArgument);
        }
        self.settings.max_speeds[axis.index()] = max_speed;
        self.axes.set_max_speed_units(axis, max_speed);
        info!("Max {:?} speed: {}{}/s", axis, max_speed, axis.unit());
        Ok(())
    }

    pub fn set_inverted(&mut self, axis: Axis, inverted: bool) {
        self.settings.inverted.set(Axes::from(axis), inverted);
        self.axes.set_inverted(self.settings.inverted);
        info!("{:?} inversion: {}", axis, inverted);
    }

    pub fn set_hall_offset(&mut self, axis: Axis, degrees: f64) -> Result<()> {
        if !axis.is_rotary() {
            return Err(Error::InvalidArgument);
        }
        self.settings.hall_offsets[axis.index()] = degrees;
        info!("{:?} offset: {}deg", axis, degrees);
        Ok(())
    }

    pub fn set_homing_mode(&mut self, mode: Axes) {
        self.settings.homing_mode = mode;
        info!("Homing: {:?}", mode);
    }

    pub fn toggle_enable(&mut self) {
        self.enabled = !self.enabled;
        self.axes.set_enabled(self.enabled);
        info!("{}", if self.enabled { "Enabled" } else { "Disabled" });
    }

    pub fn toggle_acceleration(&mut self) {
        self.settings.acceleration_enabled = !self.settings.acceleration_enabled;
        info!("Acceleration: {}", self.settings.acceleration_enabled);
    }

    pub fn set_ramp_increment(&mut self, axis: Axis, increment_us: u32) {
        self.settings.ramp.increment_us[axis.index()] = increment_us;
        info!("{:?} accel delay: {}us", axis, increment_us);
    }

    pub fn toggle_limits(&mut self) {
        self.settings.limits.enabled = !self.settings.limits.enabled;
        info!("Soft limits: {}", self.settings.limits.enabled);
    }

    pub fn set_limit(&mut self, axis: Axis, min: Option<f64>, max: Option<f64>) {
        let i = axis.index();
        if let Some(min) = min {
            self.settings.limits.min[i] = min;
        }
        if let Some(max) = max {
            self.settings.limits.max[i] = max;
        }
        info!("{:?} limits: [{}, {}]", axis, self.settings.limits.min[i], self.settings.limits.max[i]);
    }

    pub fn set_degrees_per_shot(&mut self, degrees: f64) {
        self.settings.degrees_per_shot = degrees;
        info!("Degrees per picture: {}", degrees);
    }

    pub fn set_delay_between_shots(&mut self, delay_ms: u32) {
        self.settings.delay_between_shots_ms = delay_ms;
        info!("Delay between pictures: {}ms", delay_ms);
    }

    pub fn save_settings(&self, storage: &mut impl SettingsStorage) -> Result<()> {
        self.settings.save(storage)
    }

    //--------------------------
    //  Pictures
    //--------------------------

    fn first_two_poses(&self) -> Result<(Pose, Pose)> {
        match (self.keyframes.get(0), self.keyframes.get(1)) {
            (Some(a), Some(b)) => Ok((
                Pose::from_steps(&self.axes, a.positions),
                Pose::from_steps(&self.axes, b.positions),
            )),
            _ => Err(Error::NotEnoughKeyframes),
        }
    }

    /// The point both of the first two keyframes are looking at.
    pub fn calculate_target(&self) -> Result<TargetPoint> {
        let (p0, p1) = self.first_two_poses()?;
        let point = calculate_target_coordinate(&p0, &p1)?;
        info!("Target: x={} y={} z={}mm", point.x, point.y, point.z);
        Ok(point)
    }

    /// Slides between the first two keyframes, keeping their target point
    /// centered.
    pub fn orbit(&mut self, repeat: u32) -> Result<u32> {
        self.ensure_running()?;
        let (p0, p1) = self.first_two_poses()?;
        let point = calculate_target_coordinate(&p0, &p1)?;
        let moves = point.interpolate(&mut self.axes, p0.slider_mm, p1.slider_mm, repeat);
        info!("Orbit done, {} moves", moves);
        Ok(moves)
    }

    pub fn panorama<B: Board>(&mut self, board: &mut B) -> Result<u32> {
        self.ensure_running()?;
        sequence::panorama(
            &mut self.axes,
            &self.keyframes,
            board,
            self.settings.degrees_per_shot,
            self.settings.delay_between_shots_ms,
            1,
        )
    }

    pub fn timelapse<B: Board>(&mut self, count: u32, board: &mut B) -> Result<u32> {
        self.ensure_running()?;
        Ok(sequence::timelapse(
            &mut self.axes,
            &self.keyframes,
            board,
            count,
            self.settings.delay_between_shots_ms,
        ))
    }

    pub fn report_status<B: Board>(&self, board: &mut B) {
        info!("Status: {}", if self.enabled { "enabled" } else { "disabled" });
        if self.halted {
            warn!("Halted on low battery");
        }
        for axis in Axis::ALL {
            let state = self.axes.state(axis);
            info!(
                "{:?}: {}{} ({} steps), max {}{}/s ({} steps/s)",
                axis,
                self.axes.position_units(axis), axis.unit(), state.current_steps.0,
                self.axes.converter(axis).to_units(state.max_speed), axis.unit(), state.max_speed,
            );
        }
        info!("Battery: {}V", board.battery_voltage());
        info!("{:?}", self.settings);

        info!("Keyframe index: {:?}", self.keyframes.current_index());
        for (i, keyframe) in self.keyframes.iter().enumerate() {
            let pose = Pose::from_steps(&self.axes, keyframe.positions);
            info!(
                "{} | pan {}deg tilt {}deg slider {}mm | speeds {:?} steps/s | dwell {}ms",
                i, pose.pan_deg, pose.tilt_deg, pose.slider_mm, keyframe.speeds, keyframe.dwell_ms,
            );
        }
    }

    //--------------------------
    //  Host instructions
    //--------------------------

    /// Runs a host instruction. Errors are logged and returned, nothing else
    /// happens on error.
    pub fn execute<B: Board, ST: SettingsStorage>(
        &mut self,
        instruction: Instruction,
        board: &mut B,
        storage: &mut ST,
    ) -> Result<()> {
        use Instruction::*;

        if !matches!(instruction, RunSpeeds(_)) {
            self.speed_run = false;
        }

        let result = match instruction {
            SetStepMode(divisor) => self.set_step_mode(divisor),
            MoveAxis(axis, units) => self.move_axis(axis, units),
            RunSpeeds(speeds) => self.run_speeds(speeds),
            ToggleEnable => { self.toggle_enable(); Ok(()) }
            SetHome => { self.set_home(); Ok(()) }
            Home => self.home(board).map(drop),

            SetMaxSpeed(axis, max_speed) => self.set_max_speed(axis, max_speed),
            SetInverted(axis, inverted) => { self.set_inverted(axis, inverted); Ok(()) }
            SetHallOffset(axis, degrees) => self.set_hall_offset(axis, degrees),
            SetHomingMode(mode) => { self.set_homing_mode(mode); Ok(()) }
            SetDegreesPerShot(degrees) => { self.set_degrees_per_shot(degrees); Ok(()) }
            SetDelayBetweenShots(delay_ms) => { self.set_delay_between_shots(delay_ms); Ok(()) }
            ToggleAcceleration => { self.toggle_acceleration(); Ok(()) }
            SetRampIncrement(axis, increment_us) => { self.set_ramp_increment(axis, increment_us); Ok(()) }
            ToggleLimits => { self.toggle_limits(); Ok(()) }
            SetLimitMin(axis, min) => { self.set_limit(axis, Some(min), None); Ok(()) }
            SetLimitMax(axis, max) => { self.set_limit(axis, None, Some(max)); Ok(()) }
            SaveSettings => self.save_settings(storage),
            Report => { self.report_status(board); Ok(()) }

            AddKeyframe => self.add_keyframe().map(drop),
            AddKeyframeWithDwell(dwell_ms) => self.add_keyframe_with_dwell(dwell_ms).map(drop),
            EditKeyframe => self.edit_keyframe().map(drop),
            SetDwell(dwell_ms) => self.set_dwell(dwell_ms).map(drop),
            ClearKeyframes => { self.clear_keyframes(); Ok(()) }
            StepForward => self.step_forward(board),
            StepBackward => self.step_backward(board),
            GotoFirst => self.goto_first(board),
            GotoLast => self.goto_last(board),
            PlayAll(repeat) => self.play_all(repeat, board),
            ScaleSpeeds(factor) => self.scale_speeds(factor),

            TriggerShutter => { board.trigger_shutter(); Ok(()) }
            Panorama => self.panorama(board).map(drop),
            Timelapse(count) => self.timelapse(count, board).map(drop),
            CalculateTarget => self.calculate_target().map(drop),
            Orbit(repeat) => self.orbit(repeat).map(drop),
        };

        if let Err(e) = result {
            warn!("{:?} failed: {:?}", instruction, e);
        }
        result
    }

    /// One round of the main loop: runs the next host instruction, if any,
    /// then ticks the joystick speeds. Call it continuously.
    pub fn poll<R, B, ST>(&mut self, reader: &mut InstructionReader<R>, board: &mut B, storage: &mut ST)
    where
        R: serial::Read<u8>,
        B: Board,
        ST: SettingsStorage,
    {
        if let Ok(Some(instruction)) = reader.poll(board) {
            let _ = self.execute(instruction, board, storage);
        }
        if self.speed_run && !self.halted {
            self.axes.run_free();
        }
    }
}
