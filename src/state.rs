//! Operating phases and the events that move between them.
//!
//! Phase IDs are part of the host contract and must not be reordered.

/// Operating phase of the roaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Off = 0,
    /// Fan running, heater locked out: pre-warming beans or airflow tests.
    FanOnly = 1,
    Preheat = 2,
    Roasting = 3,
    Cooling = 4,
    /// Direct fan/heater control; the PID stays out of the loop.
    Manual = 5,
    Error = 6,
}

impl Phase {
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Wire name, as reported in `roasterState`.
    pub const fn name(self) -> &'static str {
        match self {
            Phase::Off => "OFF",
            Phase::FanOnly => "FAN_ONLY",
            Phase::Preheat => "PREHEAT",
            Phase::Roasting => "ROASTING",
            Phase::Cooling => "COOLING",
            Phase::Manual => "MANUAL",
            Phase::Error => "ERROR",
        }
    }
}

/// Inputs to the state machine. Each carries at most one scalar.
///
/// Events with no transition defined for the current phase are ignored,
/// which keeps the controller robust against a noisy command channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Stop,
    StartFanOnly { fan_pct: u8 },
    ExitFanOnly,
    StartPreheat { target_c: f32 },
    LoadBeans { setpoint_c: f32 },
    EndRoast,
    FirstCrack,
    CoolComplete,
    EnterManual,
    ExitManual,
    /// Raised internally when the safety monitor latches a fault.
    Fault,
    ClearFault,
    SetSetpoint { value_c: f32 },
    SetFanSpeed { pct: u8 },
    SetHeaterPower { pct: u8 },
    Disconnected,
}
