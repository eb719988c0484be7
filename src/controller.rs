//! The owned controller core.
//!
//! One `Controller` value aggregates the hardware port, the actuators, the
//! PID, the sensor pipeline, the safety monitor, and the host transport.
//! The top-level loop calls [`Controller::tick`]; there are no hidden
//! singletons and no interrupts mutating state behind the loop's back.
//!
//! Tick order is fixed: transport intake, then safety, then the phase
//! body, with telemetry rendered last so it reflects this tick's actuator
//! writes. Commands that arrive mid-tick wait for the next intake.

use core::fmt::Write as _;

use heapless::{String, Vec};

use crate::config::{
    COOLING_TARGET_TEMP, FAN_COOLING_DUTY, FAN_MANUAL_DEFAULT, FAN_ONLY_DEFAULT,
    FAN_PREHEAT_DUTY, FAN_ROAST_DEFAULT, FAN_ROAST_MIN_DUTY, DEFAULT_PREHEAT_TEMP,
    DEFAULT_ROAST_SETPOINT, PREHEAT_TIMEOUT_MS, SETPOINT_MAX, SETPOINT_MIN,
};
use crate::fan::Fan;
use crate::filter::RateOfRise;
use crate::hal::Hardware;
use crate::heater::Heater;
use crate::log::*;
use crate::pid::Pid;
use crate::protocol::{self, Command, ErrorPayload, RoastEventPayload, StatePayload};
use crate::safety::{Fault, FaultCode, SafetyInputs, SafetyMonitor};
use crate::state::{Event, Phase};
use crate::thermistor;
use crate::thermocouple::Thermocouple;
use crate::transport::{Link, Transport, MAX_COMMANDS_PER_TICK};

pub struct Controller<H: Hardware> {
    hw: H,
    phase: Phase,

    // Roast session data
    setpoint_c: f32,
    preheat_target_c: f32,
    roast_epoch_ms: u64,
    preheat_epoch_ms: u64,
    first_crack_marked: bool,
    first_crack_offset_ms: u64,

    // Per-mode remembered settings
    manual_fan_pct: u8,
    manual_heater_pct: u8,
    fan_only_pct: u8,

    fan: Fan,
    heater: Heater,
    pid: Pid,
    thermocouple: Thermocouple,
    ror: RateOfRise,
    safety: SafetyMonitor,
    transport: Transport,
}

impl<H: Hardware> Controller<H> {
    pub fn new(mut hw: H) -> Self {
        let now = hw.now_ms();

        let mut fan = Fan::new();
        let mut heater = Heater::new();
        fan.disable(&mut hw);
        heater.disable(&mut hw);

        let mut transport = Transport::new();
        transport.send_connected(now);

        info!("controller initialized - OFF");

        Self {
            hw,
            phase: Phase::Off,
            setpoint_c: DEFAULT_ROAST_SETPOINT,
            preheat_target_c: DEFAULT_PREHEAT_TEMP,
            roast_epoch_ms: 0,
            preheat_epoch_ms: 0,
            first_crack_marked: false,
            first_crack_offset_ms: 0,
            manual_fan_pct: FAN_MANUAL_DEFAULT,
            manual_heater_pct: 0,
            fan_only_pct: FAN_ONLY_DEFAULT,
            fan,
            heater,
            pid: Pid::new(),
            thermocouple: Thermocouple::new(),
            ror: RateOfRise::new(),
            safety: SafetyMonitor::new(),
            transport,
        }
    }

    /// One pass of the control loop.
    pub fn tick<L: Link>(&mut self, link: &mut L) {
        let now = self.hw.now_ms();

        // 1. Transport intake.
        let mut commands: Vec<Command, MAX_COMMANDS_PER_TICK> = Vec::new();
        let disconnected = self.transport.intake(link, now, &mut commands);
        for command in commands {
            self.apply_command(command, now);
        }
        if disconnected {
            self.host_log(now, "warn", "SERIAL", "Host link lost - failing safe");
            self.handle_event(Event::Disconnected, now);
        }

        // 2. Acquisition and safety.
        let chamber_c = self.thermocouple.read_filtered(&mut self.hw);
        let heater_body_c = thermistor::read_celsius(&mut self.hw);
        self.ror.update(chamber_c, now);

        let verdict = self.safety.check(&SafetyInputs {
            chamber_c,
            heater_body_c,
            tc_fault: self.thermocouple.fault(),
            fan_enabled: self.fan.is_enabled(),
            fan_speed_pct: self.fan.speed_pct(),
            heater_enabled: self.heater.is_enabled(),
        });
        if let Some(warning) = verdict.warning {
            warn!("safety: {}", warning.message());
            self.host_log(now, "warn", "SAFETY", warning.message());
        }
        if let Some(fault) = verdict.fault {
            self.latch_fault(fault, now);
        }

        // 3. Phase body.
        self.update_phase(chamber_c, now);

        // 4. Telemetry, reflecting this tick's actuator writes.
        if self.transport.state_due(now) {
            let message = self.render_state(now);
            self.transport.enqueue_rendered(message);
        }
        self.transport.flush(link);
    }

    fn apply_command(&mut self, command: Command, now: u64) {
        match command {
            Command::StartPreheat { target_c } => {
                self.handle_event(Event::StartPreheat { target_c }, now)
            }
            Command::LoadBeans { setpoint_c } => {
                self.handle_event(Event::LoadBeans { setpoint_c }, now)
            }
            Command::EnterFanOnly { fan_pct } => {
                self.handle_event(Event::StartFanOnly { fan_pct }, now)
            }
            Command::ExitFanOnly => self.handle_event(Event::ExitFanOnly, now),
            Command::EndRoast => self.handle_event(Event::EndRoast, now),
            Command::MarkFirstCrack => self.handle_event(Event::FirstCrack, now),
            Command::Stop => self.handle_event(Event::Stop, now),
            Command::EnterManual => self.handle_event(Event::EnterManual, now),
            Command::ExitManual => self.handle_event(Event::ExitManual, now),
            Command::ClearFault => self.handle_event(Event::ClearFault, now),
            Command::SetSetpoint { value } => {
                self.handle_event(Event::SetSetpoint { value_c: value }, now)
            }
            Command::SetFanSpeed { value } => self.handle_event(
                Event::SetFanSpeed {
                    pct: protocol::clamp_pct(value),
                },
                now,
            ),
            Command::SetHeaterPower { value } => self.handle_event(
                Event::SetHeaterPower {
                    pct: protocol::clamp_pct(value),
                },
                now,
            ),
            Command::GetState => {
                let message = self.render_state(now);
                self.transport.enqueue_rendered(message);
            }
            Command::DebugFan => {
                let mut message: String<96> = String::new();
                let _ = write!(
                    message,
                    "fan: enabled={} speed={}%",
                    self.fan.is_enabled(),
                    self.fan.speed_pct()
                );
                self.host_log(now, "debug", "HW", &message);
            }
            Command::TestFanPins => {
                self.host_log(now, "debug", "HW", "direct pin test not available on this build");
            }
            Command::Ignored => {
                debug!("dropping unrecognized command");
            }
        }
    }

    /// Run one event through the transition table. Events with no entry
    /// for the current phase are ignored.
    pub fn handle_event(&mut self, event: Event, now: u64) {
        match event {
            Event::Stop => {
                if !matches!(self.phase, Phase::Off | Phase::Error) {
                    self.enter_phase(Phase::Off, now);
                }
            }
            Event::StartFanOnly { fan_pct } => {
                if self.phase == Phase::Off {
                    self.fan_only_pct = fan_pct.min(100);
                    self.enter_phase(Phase::FanOnly, now);
                }
            }
            Event::ExitFanOnly => {
                if self.phase == Phase::FanOnly {
                    self.enter_phase(Phase::Off, now);
                }
            }
            Event::StartPreheat { target_c } => {
                if matches!(self.phase, Phase::Off | Phase::FanOnly) {
                    if !setpoint_in_range(target_c) {
                        self.reject_temperature(target_c, now);
                        return;
                    }
                    self.preheat_target_c = target_c;
                    self.enter_phase(Phase::Preheat, now);
                }
            }
            Event::LoadBeans { setpoint_c } => {
                if self.phase == Phase::Preheat {
                    if !setpoint_in_range(setpoint_c) {
                        self.reject_temperature(setpoint_c, now);
                        return;
                    }
                    self.setpoint_c = setpoint_c;
                    self.enter_phase(Phase::Roasting, now);
                }
            }
            Event::EndRoast => {
                if self.phase == Phase::Roasting {
                    self.enter_phase(Phase::Cooling, now);
                }
            }
            Event::FirstCrack => {
                if self.phase == Phase::Roasting && !self.first_crack_marked {
                    self.first_crack_marked = true;
                    self.first_crack_offset_ms = now.saturating_sub(self.roast_epoch_ms).max(1);
                    info!("first crack at {} ms", self.first_crack_offset_ms);

                    let payload = RoastEventPayload {
                        event: "FIRST_CRACK",
                        roast_time_ms: self.roast_time_ms(now),
                        chamber_temp: self.chamber_temp_for_wire(),
                    };
                    self.transport
                        .enqueue_rendered(protocol::render("roastEvent", now, &payload));
                }
            }
            Event::CoolComplete => {
                if self.phase == Phase::Cooling {
                    self.enter_phase(Phase::Off, now);
                }
            }
            Event::EnterManual => {
                if self.phase == Phase::Off {
                    self.enter_phase(Phase::Manual, now);
                }
            }
            Event::ExitManual => {
                if self.phase == Phase::Manual {
                    self.enter_phase(Phase::Off, now);
                }
            }
            Event::Fault => {
                if self.phase != Phase::Error {
                    self.enter_phase(Phase::Error, now);
                }
            }
            Event::ClearFault => {
                if self.phase == Phase::Error {
                    self.safety.clear();
                    self.host_log(now, "info", "SAFETY", "Fault cleared by host");
                    self.enter_phase(Phase::Off, now);
                }
            }
            Event::SetSetpoint { value_c } => {
                if matches!(self.phase, Phase::Off | Phase::Preheat | Phase::Roasting) {
                    if !setpoint_in_range(value_c) {
                        self.reject_temperature(value_c, now);
                        return;
                    }
                    match self.phase {
                        Phase::Preheat => {
                            self.preheat_target_c = value_c;
                            self.pid.set_setpoint(value_c);
                        }
                        Phase::Roasting => {
                            self.setpoint_c = value_c;
                            self.pid.set_setpoint(value_c);
                        }
                        _ => self.setpoint_c = value_c,
                    }
                    info!("setpoint changed to {}", value_c);
                }
            }
            Event::SetFanSpeed { pct } => match self.phase {
                Phase::FanOnly => {
                    self.fan_only_pct = pct.min(100);
                    self.fan.set_speed(&mut self.hw, pct);
                }
                Phase::Preheat | Phase::Roasting => {
                    let pct = pct.max(FAN_ROAST_MIN_DUTY);
                    self.fan.set_speed(&mut self.hw, pct);
                }
                Phase::Manual => {
                    // Accepted verbatim; if this starves an energized
                    // heater the interlock latches on the next pass.
                    self.manual_fan_pct = pct.min(100);
                    self.fan.set_speed(&mut self.hw, pct);
                }
                _ => {}
            },
            Event::SetHeaterPower { pct } => {
                if self.phase == Phase::Manual {
                    self.manual_heater_pct = pct.min(100);
                    self.heater.set_power_pct(pct);
                }
            }
            Event::Disconnected => match self.phase {
                Phase::Preheat | Phase::Roasting => self.enter_phase(Phase::Cooling, now),
                Phase::Manual | Phase::FanOnly => self.enter_phase(Phase::Off, now),
                _ => {}
            },
        }
    }

    fn enter_phase(&mut self, next: Phase, now: u64) {
        if next == self.phase {
            return;
        }
        let previous = self.phase;
        self.phase = next;
        info!("state: {} -> {}", previous.name(), next.name());

        match next {
            Phase::Off => {
                self.fan.disable(&mut self.hw);
                self.heater.disable(&mut self.hw);
                self.pid.disable();
                self.roast_epoch_ms = 0;
                self.preheat_epoch_ms = 0;
                self.first_crack_marked = false;
                self.first_crack_offset_ms = 0;
                self.ror.reset();
            }
            Phase::FanOnly => {
                self.heater.disable(&mut self.hw);
                self.pid.disable();
                self.fan.set_speed(&mut self.hw, self.fan_only_pct);
                self.fan.enable(&mut self.hw);
            }
            Phase::Preheat => {
                // The session timer spans PREHEAT through COOLING.
                self.preheat_epoch_ms = now;
                self.roast_epoch_ms = now;
                self.fan.set_speed(&mut self.hw, FAN_PREHEAT_DUTY);
                self.fan.enable(&mut self.hw);
                self.pid.set_setpoint(self.preheat_target_c);
                self.pid.reset();
                self.pid.enable();
                self.heater.enable(&mut self.hw);
            }
            Phase::Roasting => {
                self.first_crack_marked = false;
                self.first_crack_offset_ms = 0;
                self.pid.set_setpoint(self.setpoint_c);
                self.pid.reset();
                self.pid.enable();
                self.fan.set_speed(&mut self.hw, FAN_ROAST_DEFAULT);
                self.fan.enable(&mut self.hw);
                self.heater.enable(&mut self.hw);
                self.ror.reset();
            }
            Phase::Cooling => {
                self.heater.disable(&mut self.hw);
                self.pid.disable();
                self.fan.set_speed(&mut self.hw, FAN_COOLING_DUTY);
                self.fan.enable(&mut self.hw);
            }
            Phase::Manual => {
                self.manual_fan_pct = FAN_MANUAL_DEFAULT;
                self.manual_heater_pct = 0;
                self.fan.set_speed(&mut self.hw, self.manual_fan_pct);
                self.fan.enable(&mut self.hw);
                self.heater.set_power_pct(self.manual_heater_pct);
                self.heater.enable(&mut self.hw);
                self.pid.disable();
            }
            Phase::Error => {
                self.fan.disable(&mut self.hw);
                self.heater.disable(&mut self.hw);
                self.pid.disable();
            }
        }

        let mut message: String<64> = String::new();
        let _ = write!(message, "Entering {}", next.name());
        self.host_log(now, "info", "STATE", &message);
    }

    fn update_phase(&mut self, chamber_c: f32, now: u64) {
        match self.phase {
            Phase::Preheat => {
                self.pid.update(chamber_c, now);
                self.heater.set_pid_output(self.pid.output());
                self.heater.tick(&mut self.hw);

                if now.saturating_sub(self.preheat_epoch_ms) > PREHEAT_TIMEOUT_MS {
                    self.latch_fault(
                        Fault {
                            code: FaultCode::PreheatTimeout,
                            message: "Preheat exceeded 15 minute limit",
                            fatal: true,
                        },
                        now,
                    );
                }
            }
            Phase::Roasting => {
                self.pid.update(chamber_c, now);
                self.heater.set_pid_output(self.pid.output());
                self.heater.tick(&mut self.hw);
            }
            Phase::Cooling => {
                if chamber_c < COOLING_TARGET_TEMP {
                    self.handle_event(Event::CoolComplete, now);
                }
            }
            Phase::Manual => {
                self.heater.tick(&mut self.hw);
            }
            Phase::Off | Phase::FanOnly | Phase::Error => {}
        }
    }

    /// Latch a fault, notify the host immediately, and force ERROR.
    fn latch_fault(&mut self, fault: Fault, now: u64) {
        if !self.safety.latch(fault) {
            return;
        }
        error!("safety fault: {} - {}", fault.code.as_str(), fault.message);

        let payload = ErrorPayload {
            code: fault.code.as_str(),
            message: fault.message,
            fatal: fault.fatal,
        };
        self.transport
            .enqueue_rendered(protocol::render("error", now, &payload));

        self.handle_event(Event::Fault, now);
    }

    fn render_state(&mut self, now: u64) -> Option<protocol::JsonString> {
        let heater_temp = thermistor::read_celsius(&mut self.hw);
        let payload = StatePayload {
            state: self.phase.name(),
            state_id: self.phase.id(),
            chamber_temp: self.chamber_temp_for_wire(),
            heater_temp,
            setpoint: self.active_setpoint(),
            fan_speed: self.fan.speed_pct(),
            heater_power: self.heater.power_pct(),
            heater_enabled: self.heater.is_enabled(),
            pid_enabled: self.pid.is_enabled(),
            roast_time_ms: self.roast_time_ms(now),
            first_crack_marked: self.first_crack_marked,
            first_crack_time_ms: self
                .first_crack_marked
                .then_some(self.first_crack_offset_ms),
            ror: self.ror.value(),
            error: self.safety.fault().map(|fault| ErrorPayload {
                code: fault.code.as_str(),
                message: fault.message,
                fatal: fault.fatal,
            }),
        };
        protocol::render("roasterState", now, &payload)
    }

    fn chamber_temp_for_wire(&self) -> Option<f32> {
        if self.thermocouple.fault().is_empty() && self.thermocouple.has_valid_sample() {
            Some(self.thermocouple.filtered())
        } else {
            None
        }
    }

    /// The setpoint the PID is (or would be) chasing in the current phase.
    fn active_setpoint(&self) -> f32 {
        if self.phase == Phase::Preheat {
            self.preheat_target_c
        } else {
            self.setpoint_c
        }
    }

    fn roast_time_ms(&self, now: u64) -> u64 {
        if self.roast_epoch_ms > 0 {
            now.saturating_sub(self.roast_epoch_ms)
        } else {
            0
        }
    }

    fn reject_temperature(&mut self, value: f32, now: u64) {
        warn!("rejecting out-of-range temperature {}", value);
        let mut message: String<96> = String::new();
        let _ = write!(message, "Rejected out-of-range temperature {}", value);
        self.host_log(now, "warn", "STATE", &message);
    }

    fn host_log(&mut self, now: u64, level: &str, source: &str, message: &str) {
        self.transport.send_log(now, level, source, message);
    }

    // ---- accessors ----

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.safety.fault()
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}

fn setpoint_in_range(value: f32) -> bool {
    (SETPOINT_MIN..=SETPOINT_MAX).contains(&value)
}
