//! Host wire protocol: one JSON object per line, both directions.
//!
//! Every message is the envelope `{"type": ..., "timestamp": ..., "payload": {...}}`.
//! Inbound parsing is schema-directed: the envelope is decoded with
//! `serde-json-core`, the `type` string selects a [`Command`], and anything
//! unrecognized maps to [`Command::Ignored`] so a chatty or newer host
//! never disturbs the machine.

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_PREHEAT_TEMP, DEFAULT_ROAST_SETPOINT, FAN_ONLY_DEFAULT};

/// Budget for one rendered outbound line. The largest message is a
/// `roasterState` carrying a nested error object, a little over 400
/// bytes.
pub const MAX_MESSAGE: usize = 512;

pub type JsonString = String<MAX_MESSAGE>;

/// A framed, recognized host command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    StartPreheat { target_c: f32 },
    LoadBeans { setpoint_c: f32 },
    EnterFanOnly { fan_pct: u8 },
    ExitFanOnly,
    EndRoast,
    MarkFirstCrack,
    Stop,
    EnterManual,
    ExitManual,
    ClearFault,
    SetSetpoint { value: f32 },
    SetFanSpeed { value: f32 },
    SetHeaterPower { value: f32 },
    GetState,
    DebugFan,
    TestFanPins,
    /// Unknown type, malformed JSON, or a known type missing its value.
    Ignored,
}

#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    /// Sender clock; carried by every host message but not used for
    /// anything on this side.
    #[allow(dead_code)]
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    payload: Option<CommandPayload>,
}

/// Union of every numeric field a command payload may carry.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandPayload {
    target_temp: Option<f32>,
    setpoint: Option<f32>,
    fan_speed: Option<f32>,
    value: Option<f32>,
}

/// Parse one complete line into a command.
pub fn parse_line(line: &str) -> Command {
    let Ok((envelope, _rest)) = serde_json_core::from_str::<Envelope>(line) else {
        return Command::Ignored;
    };
    let payload = envelope.payload.unwrap_or_default();

    match envelope.kind {
        "startPreheat" => Command::StartPreheat {
            target_c: payload.target_temp.unwrap_or(DEFAULT_PREHEAT_TEMP),
        },
        "loadBeans" => Command::LoadBeans {
            setpoint_c: payload.setpoint.unwrap_or(DEFAULT_ROAST_SETPOINT),
        },
        "enterFanOnly" => Command::EnterFanOnly {
            fan_pct: payload
                .fan_speed
                .map(clamp_pct)
                .unwrap_or(FAN_ONLY_DEFAULT),
        },
        "exitFanOnly" => Command::ExitFanOnly,
        "endRoast" => Command::EndRoast,
        "markFirstCrack" => Command::MarkFirstCrack,
        "stop" => Command::Stop,
        "enterManual" => Command::EnterManual,
        "exitManual" => Command::ExitManual,
        "clearFault" => Command::ClearFault,
        "setSetpoint" => match payload.value {
            Some(value) => Command::SetSetpoint { value },
            None => Command::Ignored,
        },
        "setFanSpeed" => match payload.value {
            Some(value) => Command::SetFanSpeed { value },
            None => Command::Ignored,
        },
        "setHeaterPower" => match payload.value {
            Some(value) => Command::SetHeaterPower { value },
            None => Command::Ignored,
        },
        "getState" => Command::GetState,
        "debugFan" => Command::DebugFan,
        "testFanPins" => Command::TestFanPins,
        _ => Command::Ignored,
    }
}

/// Clamp a raw numeric percentage from the wire into 0..100.
pub fn clamp_pct(value: f32) -> u8 {
    if value <= 0.0 {
        0
    } else if value >= 100.0 {
        100
    } else {
        value as u8
    }
}

// ============== Outbound messages ==============

#[derive(Serialize)]
struct Outbound<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    timestamp: u64,
    payload: T,
}

/// Render one outbound envelope. `None` means the payload outgrew the line
/// budget; the caller drops the message rather than sending a torn line.
pub fn render<T: Serialize>(kind: &str, timestamp: u64, payload: &T) -> Option<JsonString> {
    serde_json_core::to_string(&Outbound {
        kind,
        timestamp,
        payload,
    })
    .ok()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload<'a> {
    pub state: &'a str,
    pub state_id: u8,
    pub chamber_temp: Option<f32>,
    pub heater_temp: f32,
    pub setpoint: f32,
    pub fan_speed: u8,
    pub heater_power: u8,
    pub heater_enabled: bool,
    pub pid_enabled: bool,
    pub roast_time_ms: u64,
    pub first_crack_marked: bool,
    pub first_crack_time_ms: Option<u64>,
    pub ror: f32,
    pub error: Option<ErrorPayload<'a>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ErrorPayload<'a> {
    pub code: &'a str,
    pub message: &'a str,
    pub fatal: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectedPayload<'a> {
    pub firmware: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoastEventPayload<'a> {
    pub event: &'a str,
    pub roast_time_ms: u64,
    pub chamber_temp: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct LogPayload<'a> {
    pub level: &'a str,
    pub source: &'a str,
    pub message: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_with_payload() {
        let cmd = parse_line(r#"{"type":"startPreheat","timestamp":1712000,"payload":{"targetTemp":190}}"#);
        assert_eq!(cmd, Command::StartPreheat { target_c: 190.0 });
    }

    #[test]
    fn missing_payload_uses_defaults() {
        assert_eq!(
            parse_line(r#"{"type":"startPreheat","timestamp":0}"#),
            Command::StartPreheat { target_c: 180.0 }
        );
        assert_eq!(
            parse_line(r#"{"type":"enterFanOnly","timestamp":0,"payload":{}}"#),
            Command::EnterFanOnly { fan_pct: 50 }
        );
    }

    #[test]
    fn bare_commands_parse() {
        assert_eq!(parse_line(r#"{"type":"stop","timestamp":5,"payload":{}}"#), Command::Stop);
        assert_eq!(
            parse_line(r#"{"type":"markFirstCrack","timestamp":5,"payload":{}}"#),
            Command::MarkFirstCrack
        );
        assert_eq!(
            parse_line(r#"{"type":"clearFault","timestamp":5,"payload":{}}"#),
            Command::ClearFault
        );
    }

    #[test]
    fn value_commands_require_a_value() {
        assert_eq!(
            parse_line(r#"{"type":"setFanSpeed","timestamp":1,"payload":{"value":65}}"#),
            Command::SetFanSpeed { value: 65.0 }
        );
        assert_eq!(
            parse_line(r#"{"type":"setFanSpeed","timestamp":1,"payload":{}}"#),
            Command::Ignored
        );
    }

    #[test]
    fn unknown_type_is_ignored() {
        assert_eq!(
            parse_line(r#"{"type":"selfDestruct","timestamp":1,"payload":{"value":1}}"#),
            Command::Ignored
        );
    }

    #[test]
    fn garbage_is_ignored() {
        assert_eq!(parse_line("not json at all"), Command::Ignored);
        assert_eq!(parse_line(r#"{"timestamp":1}"#), Command::Ignored);
        assert_eq!(parse_line(""), Command::Ignored);
    }

    #[test]
    fn pct_clamping() {
        assert_eq!(clamp_pct(-5.0), 0);
        assert_eq!(clamp_pct(0.0), 0);
        assert_eq!(clamp_pct(54.9), 54);
        assert_eq!(clamp_pct(100.0), 100);
        assert_eq!(clamp_pct(400.0), 100);
    }

    #[test]
    fn state_payload_serializes_with_wire_names() {
        let payload = StatePayload {
            state: "ROASTING",
            state_id: 3,
            chamber_temp: Some(201.5),
            heater_temp: 150.0,
            setpoint: 200.0,
            fan_speed: 90,
            heater_power: 42,
            heater_enabled: true,
            pid_enabled: true,
            roast_time_ms: 123_456,
            first_crack_marked: false,
            first_crack_time_ms: None,
            ror: 8.5,
            error: None,
        };
        let line = render("roasterState", 99, &payload).unwrap();

        assert!(line.starts_with(r#"{"type":"roasterState","timestamp":99,"payload":{"#));
        assert!(line.contains(r#""state":"ROASTING""#));
        assert!(line.contains(r#""stateId":3"#));
        assert!(line.contains(r#""heaterEnabled":true"#));
        assert!(line.contains(r#""firstCrackTimeMs":null"#));
        assert!(line.contains(r#""error":null"#));
    }

    #[test]
    fn error_payload_nests_in_state() {
        let payload = StatePayload {
            state: "ERROR",
            state_id: 6,
            chamber_temp: None,
            heater_temp: 25.0,
            setpoint: 200.0,
            fan_speed: 0,
            heater_power: 0,
            heater_enabled: false,
            pid_enabled: false,
            roast_time_ms: 0,
            first_crack_marked: false,
            first_crack_time_ms: None,
            ror: 0.0,
            error: Some(ErrorPayload {
                code: "FAN_INTERLOCK",
                message: "Fan speed too low or disabled while heater is on",
                fatal: true,
            }),
        };
        let line = render("roasterState", 5, &payload).unwrap();

        assert!(line.contains(r#""chamberTemp":null"#));
        assert!(line.contains(r#""code":"FAN_INTERLOCK""#));
        assert!(line.contains(r#""fatal":true"#));
    }

    #[test]
    fn log_payload_escapes_specials() {
        let line = render(
            "log",
            1,
            &LogPayload {
                level: "warn",
                source: "SAFETY",
                message: "quote \" backslash \\ newline \n done",
            },
        )
        .unwrap();

        assert!(line.contains(r#"quote \" backslash \\ newline \n done"#));
    }

    #[test]
    fn rendering_is_deterministic() {
        let payload = ConnectedPayload { firmware: "3.0.0" };
        let a = render("connected", 7, &payload).unwrap();
        let b = render("connected", 7, &payload).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.as_str(),
            r#"{"type":"connected","timestamp":7,"payload":{"firmware":"3.0.0"}}"#
        );
    }
}
