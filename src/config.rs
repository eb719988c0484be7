//! Compile-time configuration.
//!
//! All tunables live here so a board port only has to touch one file.

// ============== Thermistor divider ==============
// NTC on the high side of a 100k divider fed from 5 V, read by a 10-bit ADC.
pub const THERMISTOR_VCC: f32 = 5.0;
pub const THERMISTOR_R1: f32 = 100_000.0;
pub const THERMISTOR_R0: f32 = 100_000.0;
pub const THERMISTOR_T0_K: f32 = 298.15;
pub const THERMISTOR_BETA: f32 = 3950.0;

// ============== PID tuning ==============
// Aggressive set drives the error down fast when far from the setpoint;
// the conservative set holds it there without overshoot.
pub const PID_KP_AGGRESSIVE: f32 = 120.0;
pub const PID_KI_AGGRESSIVE: f32 = 30.0;
pub const PID_KD_AGGRESSIVE: f32 = 60.0;

pub const PID_KP_CONSERVATIVE: f32 = 70.0;
pub const PID_KI_CONSERVATIVE: f32 = 15.0;
pub const PID_KD_CONSERVATIVE: f32 = 10.0;

/// Distance from setpoint (°C) at which the gain set switches.
pub const PID_THRESHOLD: f32 = 10.0;

pub const PID_OUTPUT_MIN: f32 = 0.0;
pub const PID_OUTPUT_MAX: f32 = 255.0;

// ============== Safety limits ==============
pub const MAX_CHAMBER_TEMP: f32 = 260.0;
pub const WARN_CHAMBER_TEMP: f32 = 250.0;
pub const MAX_HEATER_TEMP: f32 = 250.0;
pub const WARN_HEATER_TEMP: f32 = 240.0;

/// Minimum fan duty (%) whenever the heater is enabled.
pub const MIN_FAN_WHEN_HEATING: u8 = 40;

/// Consecutive faulted thermocouple reads before a fault latches.
pub const TC_FAULT_LATCH_COUNT: u8 = 10;
/// Consecutive clean reads before the fault debouncer resets.
pub const TC_FAULT_CLEAR_COUNT: u8 = 3;

// ============== Temperature targets ==============
pub const DEFAULT_PREHEAT_TEMP: f32 = 180.0;
pub const DEFAULT_ROAST_SETPOINT: f32 = 200.0;
pub const COOLING_TARGET_TEMP: f32 = 50.0;

/// Accepted range for roast and preheat setpoints (°C). Commands outside
/// this band are rejected, not clamped.
pub const SETPOINT_MIN: f32 = 100.0;
pub const SETPOINT_MAX: f32 = 260.0;

// ============== Timing ==============
pub const STATE_SEND_INTERVAL_MS: u64 = 1000;
pub const PREHEAT_TIMEOUT_MS: u64 = 900_000;
pub const PID_WINDOW_SIZE_MS: u64 = 2000;
pub const DISCONNECT_TIMEOUT_MS: u64 = 5000;
pub const ROR_SAMPLE_INTERVAL_MS: u64 = 30_000;

// ============== Fan duty (%) ==============
pub const FAN_PREHEAT_DUTY: u8 = 50;
pub const FAN_ROAST_DEFAULT: u8 = 90;
pub const FAN_COOLING_DUTY: u8 = 100;
pub const FAN_ROAST_MIN_DUTY: u8 = 30;
pub const FAN_ONLY_DEFAULT: u8 = 50;
pub const FAN_MANUAL_DEFAULT: u8 = 50;

// ============== Temperature filtering ==============
/// Low-pass coefficient for the chamber thermocouple. Lower is smoother.
pub const LPF_ALPHA: f32 = 0.15;

// ============== Host transport ==============
/// Inbound line buffer; longer lines are dropped whole.
pub const INPUT_BUFFER_SIZE: usize = 512;
