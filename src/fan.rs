//! Blower fan.
//!
//! Speed is commanded in percent and mapped to an 8-bit PWM duty. Setting a
//! speed while the fan is disabled records the target but leaves the output
//! at zero; enabling applies the recorded speed.

use crate::hal::Hardware;
use crate::log::*;

#[derive(Debug)]
pub struct Fan {
    enabled: bool,
    speed_pct: u8,
}

impl Fan {
    pub const fn new() -> Self {
        Self {
            enabled: false,
            speed_pct: 0,
        }
    }

    pub fn enable<H: Hardware>(&mut self, hw: &mut H) {
        self.enabled = true;
        hw.set_fan_pwm(pct_to_duty(self.speed_pct));
        info!("fan enabled at {}%", self.speed_pct);
    }

    pub fn disable<H: Hardware>(&mut self, hw: &mut H) {
        self.enabled = false;
        hw.set_fan_pwm(0);
        info!("fan disabled");
    }

    pub fn set_speed<H: Hardware>(&mut self, hw: &mut H, pct: u8) {
        let pct = pct.min(100);
        self.speed_pct = pct;
        if self.enabled {
            hw.set_fan_pwm(pct_to_duty(pct));
        }
    }

    pub fn speed_pct(&self) -> u8 {
        self.speed_pct
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

fn pct_to_duty(pct: u8) -> u8 {
    (pct as u16 * 255 / 100) as u8
}
