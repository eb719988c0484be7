//! Safety supervisor.
//!
//! Runs every tick before the state machine and holds the single latched
//! fault. Once a fault latches, every further check short-circuits until
//! the host acknowledges with `clearFault`; there is no auto-recovery.
//!
//! Checks run cheapest-first and stop at the first violation:
//!
//! 1. chamber over-temperature (filtered thermocouple)
//! 2. heater-body over-temperature (thermistor)
//! 3. fan/heater interlock
//! 4. thermocouple fault bits, debounced
//!
//! The debouncer requires `TC_FAULT_LATCH_COUNT` consecutive reads with the
//! same fault detail before acting, and `TC_FAULT_CLEAR_COUNT` consecutive
//! clean reads to rearm. A short-to-GND is common electrical pickup and is
//! only ever a warning; open-circuit and short-to-VCC latch — but only
//! while the heater is energized. With the heater off they are downgraded
//! to a warning so the probe can be swapped without a fault cycle.

use crate::config::{
    MAX_CHAMBER_TEMP, MAX_HEATER_TEMP, MIN_FAN_WHEN_HEATING, TC_FAULT_CLEAR_COUNT,
    TC_FAULT_LATCH_COUNT, WARN_CHAMBER_TEMP, WARN_HEATER_TEMP,
};
use crate::thermocouple::TcFault;

/// Fault taxonomy shared with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    OverTempChamber,
    OverTempHeater,
    FanInterlock,
    ThermocoupleFault,
    PreheatTimeout,
}

impl FaultCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            FaultCode::OverTempChamber => "OVER_TEMP_CHAMBER",
            FaultCode::OverTempHeater => "OVER_TEMP_HEATER",
            FaultCode::FanInterlock => "FAN_INTERLOCK",
            FaultCode::ThermocoupleFault => "THERMOCOUPLE_FAULT",
            FaultCode::PreheatTimeout => "PREHEAT_TIMEOUT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    pub code: FaultCode,
    pub message: &'static str,
    pub fatal: bool,
}

/// Non-latching conditions worth telling the host about. Edge-triggered:
/// reported once per excursion, not every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    ChamberHot,
    HeaterHot,
    Thermocouple(TcFault),
}

impl Warning {
    pub const fn message(self) -> &'static str {
        match self {
            Warning::ChamberHot => "Chamber temperature approaching limit",
            Warning::HeaterHot => "Heater body temperature approaching limit",
            Warning::Thermocouple(_) => "Thermocouple reporting a fault",
        }
    }
}

/// Everything the checks need from one tick's acquisition.
#[derive(Debug, Clone, Copy)]
pub struct SafetyInputs {
    pub chamber_c: f32,
    pub heater_body_c: f32,
    pub tc_fault: TcFault,
    pub fan_enabled: bool,
    pub fan_speed_pct: u8,
    pub heater_enabled: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Verdict {
    pub fault: Option<Fault>,
    pub warning: Option<Warning>,
}

#[derive(Debug)]
pub struct SafetyMonitor {
    latched: Option<Fault>,
    streak_mask: TcFault,
    fault_streak: u8,
    clean_streak: u8,
    chamber_warned: bool,
    heater_warned: bool,
}

impl SafetyMonitor {
    pub const fn new() -> Self {
        Self {
            latched: None,
            streak_mask: TcFault::empty(),
            fault_streak: 0,
            clean_streak: 0,
            chamber_warned: false,
            heater_warned: false,
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.latched.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.latched.is_none()
    }

    /// Latch a fault. Returns false if one is already held.
    pub fn latch(&mut self, fault: Fault) -> bool {
        if self.latched.is_some() {
            return false;
        }
        self.latched = Some(fault);
        true
    }

    /// Host acknowledgment: drop the fault and rearm the debouncer.
    pub fn clear(&mut self) {
        self.latched = None;
        self.streak_mask = TcFault::empty();
        self.fault_streak = 0;
        self.clean_streak = 0;
        self.chamber_warned = false;
        self.heater_warned = false;
    }

    /// Evaluate all checks against this tick's readings. A returned fault
    /// is a candidate: the caller latches it via [`SafetyMonitor::latch`]
    /// so the ERROR transition and host notification happen in one place.
    pub fn check(&mut self, inputs: &SafetyInputs) -> Verdict {
        let mut verdict = Verdict::default();
        if self.latched.is_some() {
            return verdict;
        }

        if let Some(fault) = self.check_chamber(inputs, &mut verdict) {
            verdict.fault = Some(fault);
            return verdict;
        }
        if let Some(fault) = self.check_heater_body(inputs, &mut verdict) {
            verdict.fault = Some(fault);
            return verdict;
        }
        if let Some(fault) = self.check_interlock(inputs) {
            verdict.fault = Some(fault);
            return verdict;
        }
        if let Some(fault) = self.check_thermocouple(inputs, &mut verdict) {
            verdict.fault = Some(fault);
            return verdict;
        }

        verdict
    }

    fn check_chamber(&mut self, inputs: &SafetyInputs, verdict: &mut Verdict) -> Option<Fault> {
        let temp = inputs.chamber_c;

        if temp >= MAX_CHAMBER_TEMP {
            return Some(Fault {
                code: FaultCode::OverTempChamber,
                message: "Chamber temperature exceeded maximum safe limit",
                fatal: true,
            });
        }

        if temp >= WARN_CHAMBER_TEMP {
            if !self.chamber_warned {
                self.chamber_warned = true;
                verdict.warning = Some(Warning::ChamberHot);
            }
        } else {
            self.chamber_warned = false;
        }

        None
    }

    fn check_heater_body(&mut self, inputs: &SafetyInputs, verdict: &mut Verdict) -> Option<Fault> {
        let temp = inputs.heater_body_c;

        // Outside the plausible band the thermistor itself is suspect;
        // skip rather than trip on a broken divider.
        if !(-50.0..=500.0).contains(&temp) {
            return None;
        }

        if temp >= MAX_HEATER_TEMP {
            return Some(Fault {
                code: FaultCode::OverTempHeater,
                message: "Heater body temperature exceeded maximum safe limit",
                fatal: true,
            });
        }

        if temp >= WARN_HEATER_TEMP {
            if !self.heater_warned {
                self.heater_warned = true;
                verdict.warning = Some(Warning::HeaterHot);
            }
        } else {
            self.heater_warned = false;
        }

        None
    }

    fn check_interlock(&self, inputs: &SafetyInputs) -> Option<Fault> {
        if !inputs.heater_enabled {
            return None;
        }
        if !inputs.fan_enabled || inputs.fan_speed_pct < MIN_FAN_WHEN_HEATING {
            return Some(Fault {
                code: FaultCode::FanInterlock,
                message: "Fan speed too low or disabled while heater is on",
                fatal: true,
            });
        }
        None
    }

    fn check_thermocouple(&mut self, inputs: &SafetyInputs, verdict: &mut Verdict) -> Option<Fault> {
        let fault = inputs.tc_fault;

        if fault.is_empty() {
            if self.fault_streak > 0 {
                self.clean_streak += 1;
                if self.clean_streak >= TC_FAULT_CLEAR_COUNT {
                    self.fault_streak = 0;
                    self.clean_streak = 0;
                    self.streak_mask = TcFault::empty();
                }
            }
            return None;
        }

        self.clean_streak = 0;
        if fault == self.streak_mask {
            self.fault_streak = self.fault_streak.saturating_add(1);
        } else {
            self.streak_mask = fault;
            self.fault_streak = 1;
            if !fault.is_critical() {
                verdict.warning = Some(Warning::Thermocouple(fault));
            }
        }

        if fault.is_critical() && self.fault_streak >= TC_FAULT_LATCH_COUNT {
            if inputs.heater_enabled {
                return Some(Fault {
                    code: FaultCode::ThermocoupleFault,
                    message: fault.describe(),
                    fatal: true,
                });
            }
            // Heater is off: the bad probe can't burn anything down.
            if self.fault_streak == TC_FAULT_LATCH_COUNT {
                verdict.warning = Some(Warning::Thermocouple(fault));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_inputs() -> SafetyInputs {
        SafetyInputs {
            chamber_c: 180.0,
            heater_body_c: 120.0,
            tc_fault: TcFault::empty(),
            fan_enabled: true,
            fan_speed_pct: 90,
            heater_enabled: true,
        }
    }

    #[test]
    fn clean_inputs_pass() {
        let mut monitor = SafetyMonitor::new();
        let verdict = monitor.check(&clean_inputs());
        assert!(verdict.fault.is_none());
        assert!(verdict.warning.is_none());
    }

    #[test]
    fn chamber_over_temp_faults() {
        let mut monitor = SafetyMonitor::new();
        let mut inputs = clean_inputs();
        inputs.chamber_c = 261.0;

        let fault = monitor.check(&inputs).fault.unwrap();
        assert_eq!(fault.code, FaultCode::OverTempChamber);
        assert!(fault.fatal);
    }

    #[test]
    fn chamber_warning_band_is_edge_triggered() {
        let mut monitor = SafetyMonitor::new();
        let mut inputs = clean_inputs();
        inputs.chamber_c = 252.0;

        assert_eq!(monitor.check(&inputs).warning, Some(Warning::ChamberHot));
        assert!(monitor.check(&inputs).warning.is_none());

        // Dips below and comes back: warn again.
        inputs.chamber_c = 240.0;
        monitor.check(&inputs);
        inputs.chamber_c = 251.0;
        assert_eq!(monitor.check(&inputs).warning, Some(Warning::ChamberHot));
    }

    #[test]
    fn heater_body_over_temp_faults() {
        let mut monitor = SafetyMonitor::new();
        let mut inputs = clean_inputs();
        inputs.heater_body_c = 255.0;

        let fault = monitor.check(&inputs).fault.unwrap();
        assert_eq!(fault.code, FaultCode::OverTempHeater);
    }

    #[test]
    fn implausible_thermistor_reading_is_skipped() {
        let mut monitor = SafetyMonitor::new();
        let mut inputs = clean_inputs();
        inputs.heater_body_c = 999.0; // divider sentinel

        assert!(monitor.check(&inputs).fault.is_none());
    }

    #[test]
    fn interlock_requires_fan_with_heater() {
        let mut monitor = SafetyMonitor::new();
        let mut inputs = clean_inputs();
        inputs.fan_speed_pct = 20;

        let fault = monitor.check(&inputs).fault.unwrap();
        assert_eq!(fault.code, FaultCode::FanInterlock);
    }

    #[test]
    fn interlock_ignores_fan_when_heater_off() {
        let mut monitor = SafetyMonitor::new();
        let mut inputs = clean_inputs();
        inputs.heater_enabled = false;
        inputs.fan_enabled = false;
        inputs.fan_speed_pct = 0;

        assert!(monitor.check(&inputs).fault.is_none());
    }

    #[test]
    fn single_tc_glitch_does_not_latch() {
        let mut monitor = SafetyMonitor::new();
        let mut inputs = clean_inputs();

        inputs.tc_fault = TcFault::OPEN;
        assert!(monitor.check(&inputs).fault.is_none());

        inputs.tc_fault = TcFault::empty();
        for _ in 0..20 {
            assert!(monitor.check(&inputs).fault.is_none());
        }
    }

    #[test]
    fn persistent_tc_fault_latches_after_threshold() {
        let mut monitor = SafetyMonitor::new();
        let mut inputs = clean_inputs();
        inputs.tc_fault = TcFault::OPEN;

        for i in 1..TC_FAULT_LATCH_COUNT {
            assert!(monitor.check(&inputs).fault.is_none(), "latched at {i}");
        }
        let fault = monitor.check(&inputs).fault.unwrap();
        assert_eq!(fault.code, FaultCode::ThermocoupleFault);
    }

    #[test]
    fn tc_fault_with_heater_off_only_warns() {
        let mut monitor = SafetyMonitor::new();
        let mut inputs = clean_inputs();
        inputs.heater_enabled = false;
        inputs.tc_fault = TcFault::OPEN;

        let mut warned = false;
        for _ in 0..30 {
            let verdict = monitor.check(&inputs);
            assert!(verdict.fault.is_none());
            if matches!(verdict.warning, Some(Warning::Thermocouple(_))) {
                warned = true;
            }
        }
        assert!(warned);
    }

    #[test]
    fn short_to_gnd_never_latches() {
        let mut monitor = SafetyMonitor::new();
        let mut inputs = clean_inputs();
        inputs.tc_fault = TcFault::SHORT_GND;

        for _ in 0..50 {
            assert!(monitor.check(&inputs).fault.is_none());
        }
    }

    #[test]
    fn clean_reads_rearm_the_debouncer() {
        let mut monitor = SafetyMonitor::new();
        let mut inputs = clean_inputs();

        // Almost latch.
        inputs.tc_fault = TcFault::OPEN;
        for _ in 0..(TC_FAULT_LATCH_COUNT - 1) {
            monitor.check(&inputs);
        }

        // Clear streak resets the counter.
        inputs.tc_fault = TcFault::empty();
        for _ in 0..TC_FAULT_CLEAR_COUNT {
            monitor.check(&inputs);
        }

        // The fault must again persist the full threshold to latch.
        inputs.tc_fault = TcFault::OPEN;
        for i in 1..TC_FAULT_LATCH_COUNT {
            assert!(monitor.check(&inputs).fault.is_none(), "latched at {i}");
        }
        assert!(monitor.check(&inputs).fault.is_some());
    }

    #[test]
    fn latched_fault_short_circuits_checks() {
        let mut monitor = SafetyMonitor::new();
        assert!(monitor.latch(Fault {
            code: FaultCode::PreheatTimeout,
            message: "Preheat exceeded 15 minute limit",
            fatal: true,
        }));

        // A second, different violation does not replace the first.
        let mut inputs = clean_inputs();
        inputs.chamber_c = 300.0;
        assert!(monitor.check(&inputs).fault.is_none());
        assert_eq!(monitor.fault().unwrap().code, FaultCode::PreheatTimeout);

        assert!(!monitor.latch(Fault {
            code: FaultCode::FanInterlock,
            message: "x",
            fatal: true,
        }));

        monitor.clear();
        assert!(monitor.is_ok());
    }
}
