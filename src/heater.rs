//! Mains heating element behind a zero-cross SSR.
//!
//! The PID command (0..255) becomes a duty cycle over a fixed 2 s window:
//! the SSR is held HIGH for `command/255` of the window and LOW for the
//! rest. Slow switching keeps EMI down and is invisible to a thermal load
//! with a seconds-scale time constant.
//!
//! `disable` is the safety path: it drives the SSR LOW in the same call and
//! zeroes the stored command.

use crate::config::{PID_OUTPUT_MAX, PID_WINDOW_SIZE_MS};
use crate::hal::Hardware;
use crate::log::*;

#[derive(Debug)]
pub struct Heater {
    enabled: bool,
    power_pct: u8,
    pid_output: f32,
    window_start_ms: u64,
}

impl Heater {
    pub const fn new() -> Self {
        Self {
            enabled: false,
            power_pct: 0,
            pid_output: 0.0,
            window_start_ms: 0,
        }
    }

    pub fn enable<H: Hardware>(&mut self, hw: &mut H) {
        self.enabled = true;
        self.window_start_ms = hw.now_ms();
        info!("heater enabled");
    }

    pub fn disable<H: Hardware>(&mut self, hw: &mut H) {
        self.enabled = false;
        self.pid_output = 0.0;
        self.power_pct = 0;
        hw.set_ssr(false);
        info!("heater disabled");
    }

    /// Direct power command, used in manual mode only.
    pub fn set_power_pct(&mut self, pct: u8) {
        let pct = pct.min(100);
        self.power_pct = pct;
        self.pid_output = pct as f32 * PID_OUTPUT_MAX / 100.0;
    }

    /// PID command, used in the closed-loop phases.
    pub fn set_pid_output(&mut self, output: f32) {
        let output = output.clamp(0.0, PID_OUTPUT_MAX);
        self.pid_output = output;
        self.power_pct = (output * 100.0 / PID_OUTPUT_MAX) as u8;
    }

    /// Advance the time-proportioning window and set the SSR accordingly.
    pub fn tick<H: Hardware>(&mut self, hw: &mut H) {
        if !self.enabled {
            hw.set_ssr(false);
            return;
        }

        let now = hw.now_ms();
        let mut elapsed = now.saturating_sub(self.window_start_ms);
        if elapsed >= PID_WINDOW_SIZE_MS {
            self.window_start_ms = now;
            elapsed = 0;
        }

        let on_time = self.pid_output / PID_OUTPUT_MAX * PID_WINDOW_SIZE_MS as f32;
        hw.set_ssr((elapsed as f32) < on_time);
    }

    pub fn power_pct(&self) -> u8 {
        self.power_pct
    }

    pub fn pid_output(&self) -> f32 {
        self.pid_output
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
