//! Simulated roaster hardware for running the core on a workstation.
//!
//! A small thermal model stands in for the machine: the SSR pours heat in,
//! the blower carries it away, and the heater body tracks its own faster
//! dynamics. Sensor reads go through the real codecs — the chamber
//! temperature is encoded into genuine MAX31855 frames and the heater body
//! into thermistor ADC counts — so the whole acquisition pipeline is
//! exercised, not bypassed.

use embassy_time::Instant;

use crate::hal::Hardware;
use crate::thermocouple::{self, TcFault};
use crate::thermistor;

const AMBIENT_C: f32 = 25.0;
/// Chamber heating rate at full SSR duty, °C/s.
const MAX_HEATING_RATE: f32 = 3.0;
/// Heat loss to ambient per degree of difference, 1/s.
const HEAT_LOSS_COEFFICIENT: f32 = 0.02;
/// Full blower multiplies losses by this factor.
const FAN_LOSS_FACTOR: f32 = 3.0;
/// How fast the heater body chases its asymptote, 1/s.
const HEATER_BODY_RATE: f32 = 0.05;

pub struct SimulatedRoaster {
    boot: Instant,
    last_step_ms: u64,
    chamber_c: f32,
    heater_body_c: f32,
    fan_pwm: u8,
    ssr_on: bool,
    injected_fault: TcFault,
}

impl SimulatedRoaster {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
            last_step_ms: 0,
            chamber_c: AMBIENT_C,
            heater_body_c: AMBIENT_C,
            fan_pwm: 0,
            ssr_on: false,
            injected_fault: TcFault::empty(),
        }
    }

    /// Force the thermocouple to report a fault until cleared; lets a
    /// bench session exercise the safety path.
    pub fn inject_fault(&mut self, fault: TcFault) {
        self.injected_fault = fault;
    }

    pub fn chamber_c(&self) -> f32 {
        self.chamber_c
    }

    /// Integrate the model up to the current instant.
    fn step(&mut self) {
        let now = self.now_ms();
        let dt = now.saturating_sub(self.last_step_ms) as f32 / 1000.0;
        if dt <= 0.0 {
            return;
        }
        self.last_step_ms = now;

        let heat_input = if self.ssr_on { MAX_HEATING_RATE } else { 0.0 };

        let fan_fraction = self.fan_pwm as f32 / 255.0;
        let loss_rate = HEAT_LOSS_COEFFICIENT * (1.0 + FAN_LOSS_FACTOR * fan_fraction);
        let heat_loss = loss_rate * (self.chamber_c - AMBIENT_C);

        self.chamber_c += (heat_input - heat_loss) * dt;
        if self.chamber_c < AMBIENT_C {
            self.chamber_c = AMBIENT_C;
        }

        // The element itself runs hotter than the chamber while energized
        // and relaxes back toward the air around it when idle.
        let body_target = if self.ssr_on {
            self.chamber_c + 40.0
        } else {
            self.chamber_c
        };
        self.heater_body_c += (body_target - self.heater_body_c) * HEATER_BODY_RATE * dt;
    }

    /// ±0.1 °C of deterministic jitter, the way a real probe wobbles.
    fn noise(&self) -> f32 {
        (self.now_ms() % 200) as f32 / 1000.0 - 0.1
    }
}

impl Default for SimulatedRoaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Hardware for SimulatedRoaster {
    fn read_thermocouple_raw(&mut self) -> u32 {
        self.step();
        if !self.injected_fault.is_empty() {
            return thermocouple::encode_frame(0.0, self.injected_fault);
        }
        thermocouple::encode_frame(self.chamber_c + self.noise(), TcFault::empty())
    }

    fn read_thermistor_adc(&mut self) -> u16 {
        self.step();
        thermistor::adc_for_temp(self.heater_body_c)
    }

    fn set_fan_pwm(&mut self, duty: u8) {
        self.step();
        self.fan_pwm = duty;
    }

    fn set_ssr(&mut self, on: bool) {
        self.step();
        self.ssr_on = on;
    }

    fn now_ms(&self) -> u64 {
        self.boot.elapsed().as_millis()
    }
}
