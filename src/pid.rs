//! Dual-gain PID controller for the heater loop.
//!
//! - `f32` math, output clamped to 0..255 for the SSR driver
//! - Gain scheduling: aggressive gains beyond 10 °C of error, conservative
//!   inside, switched with no hysteresis
//! - Integral anti-windup via integral clamping at ±(output_max / Ki)
//! - Derivative on measurement, so setpoint steps cause no derivative kick
//! - Caller supplies the monotonic clock; a non-positive dt skips the tick
//!
//! The controller is pure given (setpoint, input, dt, stored state), which
//! keeps it unit-testable off-target.

use libm::fabsf;

use crate::config::{
    PID_KD_AGGRESSIVE, PID_KD_CONSERVATIVE, PID_KI_AGGRESSIVE, PID_KI_CONSERVATIVE,
    PID_KP_AGGRESSIVE, PID_KP_CONSERVATIVE, PID_OUTPUT_MAX, PID_OUTPUT_MIN, PID_THRESHOLD,
};
use crate::log::*;

#[derive(Debug)]
pub struct Pid {
    kp: f32,
    ki: f32,
    kd: f32,
    setpoint: f32,
    output: f32,
    integral: f32,
    last_input: f32,
    last_time_ms: u64,
    primed: bool,
    enabled: bool,
    aggressive: bool,
}

impl Pid {
    pub const fn new() -> Self {
        Self {
            kp: PID_KP_CONSERVATIVE,
            ki: PID_KI_CONSERVATIVE,
            kd: PID_KD_CONSERVATIVE,
            setpoint: 0.0,
            output: 0.0,
            integral: 0.0,
            last_input: 0.0,
            last_time_ms: 0,
            primed: false,
            enabled: false,
            aggressive: false,
        }
    }

    pub fn set_setpoint(&mut self, setpoint: f32) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn set_tunings(&mut self, kp: f32, ki: f32, kd: f32) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    pub fn tunings(&self) -> (f32, f32, f32) {
        (self.kp, self.ki, self.kd)
    }

    pub fn is_aggressive(&self) -> bool {
        self.aggressive
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        self.primed = false;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.output = 0.0;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn reset(&mut self) {
        self.output = 0.0;
        self.integral = 0.0;
        self.last_input = 0.0;
        self.last_time_ms = 0;
        self.primed = false;
    }

    /// Run one compute step against the measured temperature.
    ///
    /// The first call after `enable`/`reset` only seeds the stored input
    /// and time; the output is held until a dt is available.
    pub fn update(&mut self, input: f32, now_ms: u64) {
        if !self.enabled {
            self.output = 0.0;
            return;
        }

        if !self.primed {
            self.primed = true;
            self.last_time_ms = now_ms;
            self.last_input = input;
            return;
        }

        let dt = now_ms.saturating_sub(self.last_time_ms) as f32 / 1000.0;
        if dt <= 0.0 {
            return;
        }

        let error = self.setpoint - input;
        self.schedule_gains(error);

        let p_term = self.kp * error;

        self.integral += error * dt;
        let windup_limit = PID_OUTPUT_MAX / self.ki;
        self.integral = self.integral.clamp(-windup_limit, windup_limit);
        let i_term = self.ki * self.integral;

        // Derivative on measurement, not on error.
        let d_term = -self.kd * (input - self.last_input) / dt;

        self.output = (p_term + i_term + d_term).clamp(PID_OUTPUT_MIN, PID_OUTPUT_MAX);

        self.last_time_ms = now_ms;
        self.last_input = input;
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    fn schedule_gains(&mut self, error: f32) {
        let distance = fabsf(error);
        if distance > PID_THRESHOLD && !self.aggressive {
            self.set_tunings(PID_KP_AGGRESSIVE, PID_KI_AGGRESSIVE, PID_KD_AGGRESSIVE);
            self.aggressive = true;
            debug!("pid: aggressive tunings");
        } else if distance <= PID_THRESHOLD && self.aggressive {
            self.set_tunings(PID_KP_CONSERVATIVE, PID_KI_CONSERVATIVE, PID_KD_CONSERVATIVE);
            self.aggressive = false;
            debug!("pid: conservative tunings");
        }
    }
}
