//! Byte-stream transport to the host.
//!
//! The core is transport-agnostic: whatever carries the bytes (USB serial
//! today) implements [`Link`]. This module owns line framing, the
//! connection-activity clock, the 1 Hz telemetry cadence, and a bounded
//! best-effort outbox for everything the controller wants to say.
//!
//! Framing rules: UTF-8, one JSON object per line terminated by `\n`;
//! `\r` is ignored; a line longer than the input buffer is dropped whole.

use heapless::{Deque, Vec};

use crate::config::{DISCONNECT_TIMEOUT_MS, INPUT_BUFFER_SIZE, STATE_SEND_INTERVAL_MS};
use crate::log::*;
use crate::protocol::{self, Command, ConnectedPayload, JsonString, LogPayload};

/// Maximum commands accepted in a single tick's intake; the rest of a
/// burst is dropped.
pub const MAX_COMMANDS_PER_TICK: usize = 16;

const OUTBOX_DEPTH: usize = 8;

/// The physical byte stream.
pub trait Link {
    /// Pull one inbound byte if one is waiting.
    fn poll_byte(&mut self) -> Option<u8>;

    /// Push one complete line. Implementations append the newline.
    fn write_line(&mut self, line: &str);
}

#[derive(Debug)]
pub struct Transport {
    line: Vec<u8, INPUT_BUFFER_SIZE>,
    overflowed: bool,
    connection_active: bool,
    last_rx_ms: u64,
    last_state_tx_ms: u64,
    outbox: Deque<JsonString, OUTBOX_DEPTH>,
}

impl Transport {
    pub const fn new() -> Self {
        Self {
            line: Vec::new(),
            overflowed: false,
            connection_active: false,
            last_rx_ms: 0,
            last_state_tx_ms: 0,
            outbox: Deque::new(),
        }
    }

    /// Drain inbound bytes into framed commands. Returns `true` exactly
    /// once per disconnect: when a previously active host has been silent
    /// for the timeout.
    pub fn intake<L: Link>(
        &mut self,
        link: &mut L,
        now_ms: u64,
        commands: &mut Vec<Command, MAX_COMMANDS_PER_TICK>,
    ) -> bool {
        while let Some(byte) = link.poll_byte() {
            self.last_rx_ms = now_ms;
            if !self.connection_active {
                self.connection_active = true;
                info!("host connected");
                self.send_connected(now_ms);
            }

            match byte {
                b'\n' => {
                    let complete = !self.overflowed && !self.line.is_empty();
                    if complete {
                        if let Ok(text) = core::str::from_utf8(&self.line) {
                            let command = protocol::parse_line(text);
                            if commands.push(command).is_err() {
                                warn!("command burst overflow, dropping");
                            }
                        }
                    }
                    self.line.clear();
                    self.overflowed = false;
                }
                b'\r' => {}
                _ => {
                    if !self.overflowed && self.line.push(byte).is_err() {
                        // Oversized line: discard everything up to the next
                        // terminator.
                        warn!("input line overflow, dropping line");
                        self.line.clear();
                        self.overflowed = true;
                    }
                }
            }
        }

        if self.connection_active
            && now_ms.saturating_sub(self.last_rx_ms) >= DISCONNECT_TIMEOUT_MS
        {
            self.connection_active = false;
            warn!("host silent for {} ms, treating as disconnected", DISCONNECT_TIMEOUT_MS);
            return true;
        }

        false
    }

    /// Whether periodic telemetry is due this tick. Telemetry runs only
    /// while a host is on the line; `getState` bypasses this.
    pub fn state_due(&mut self, now_ms: u64) -> bool {
        if !self.connection_active {
            return false;
        }
        if now_ms.saturating_sub(self.last_state_tx_ms) >= STATE_SEND_INTERVAL_MS {
            self.last_state_tx_ms = now_ms;
            return true;
        }
        false
    }

    pub fn is_active(&self) -> bool {
        self.connection_active
    }

    /// Queue a rendered line. Best-effort: when the outbox is full the
    /// oldest line is dropped so fresh state wins.
    pub fn enqueue(&mut self, message: JsonString) {
        if self.outbox.is_full() {
            self.outbox.pop_front();
        }
        // Cannot fail after the pop.
        let _ = self.outbox.push_back(message);
    }

    pub fn enqueue_rendered(&mut self, message: Option<JsonString>) {
        if let Some(message) = message {
            self.enqueue(message);
        } else {
            warn!("outbound message exceeded line budget, dropped");
        }
    }

    /// Host-visible log line.
    pub fn send_log(&mut self, now_ms: u64, level: &str, source: &str, message: &str) {
        self.enqueue_rendered(protocol::render(
            "log",
            now_ms,
            &LogPayload {
                level,
                source,
                message,
            },
        ));
    }

    pub fn send_connected(&mut self, now_ms: u64) {
        self.enqueue_rendered(protocol::render(
            "connected",
            now_ms,
            &ConnectedPayload {
                firmware: crate::VERSION,
            },
        ));
    }

    /// Write out everything queued this tick.
    pub fn flush<L: Link>(&mut self, link: &mut L) {
        while let Some(message) = self.outbox.pop_front() {
            link.write_line(&message);
        }
    }
}

/// In-memory link for tests and loopback use: bytes are pushed into `rx`,
/// sent lines accumulate in `sent` (oldest dropped on overflow).
#[cfg(any(test, feature = "std"))]
#[derive(Debug, Default)]
pub struct BufferLink {
    rx: Deque<u8, 2048>,
    pub sent: Deque<JsonString, 64>,
}

#[cfg(any(test, feature = "std"))]
impl BufferLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound line, appending the terminator.
    pub fn push_line(&mut self, line: &str) {
        for byte in line.as_bytes() {
            let _ = self.rx.push_back(*byte);
        }
        let _ = self.rx.push_back(b'\n');
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            let _ = self.rx.push_back(*byte);
        }
    }

    /// All captured lines of the given message type, oldest first.
    pub fn lines_of_type(&self, kind: &str) -> impl Iterator<Item = &JsonString> {
        let mut needle = heapless::String::<64>::new();
        let _ = needle.push_str("\"type\":\"");
        let _ = needle.push_str(kind);
        let _ = needle.push_str("\"");
        self.sent
            .iter()
            .filter(move |line| line.as_str().contains(needle.as_str()))
    }

    pub fn count_of_type(&self, kind: &str) -> usize {
        self.lines_of_type(kind).count()
    }

    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }
}

#[cfg(any(test, feature = "std"))]
impl Link for BufferLink {
    fn poll_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn write_line(&mut self, line: &str) {
        let mut owned = JsonString::new();
        if owned.push_str(line).is_err() {
            return;
        }
        if self.sent.is_full() {
            self.sent.pop_front();
        }
        let _ = self.sent.push_back(owned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(
        transport: &mut Transport,
        link: &mut BufferLink,
        now_ms: u64,
    ) -> (Vec<Command, MAX_COMMANDS_PER_TICK>, bool) {
        let mut commands = Vec::new();
        let disconnected = transport.intake(link, now_ms, &mut commands);
        (commands, disconnected)
    }

    #[test]
    fn frames_one_command_per_line() {
        let mut transport = Transport::new();
        let mut link = BufferLink::new();
        link.push_line(r#"{"type":"stop","timestamp":1,"payload":{}}"#);
        link.push_line(r#"{"type":"getState","timestamp":2,"payload":{}}"#);

        let (commands, _) = drain(&mut transport, &mut link, 1_000);
        assert_eq!(commands.as_slice(), &[Command::Stop, Command::GetState]);
    }

    #[test]
    fn carriage_returns_are_ignored() {
        let mut transport = Transport::new();
        let mut link = BufferLink::new();
        link.push_bytes(b"{\"type\":\"stop\",\"timestamp\":1,\"payload\":{}}\r\n");

        let (commands, _) = drain(&mut transport, &mut link, 1_000);
        assert_eq!(commands.as_slice(), &[Command::Stop]);
    }

    #[test]
    fn partial_line_waits_for_terminator() {
        let mut transport = Transport::new();
        let mut link = BufferLink::new();
        link.push_bytes(b"{\"type\":\"st");

        let (commands, _) = drain(&mut transport, &mut link, 1_000);
        assert!(commands.is_empty());

        link.push_bytes(b"op\",\"timestamp\":1,\"payload\":{}}\n");
        let (commands, _) = drain(&mut transport, &mut link, 1_100);
        assert_eq!(commands.as_slice(), &[Command::Stop]);
    }

    #[test]
    fn oversized_line_is_dropped_whole() {
        let mut transport = Transport::new();
        let mut link = BufferLink::new();

        // Stuff more than the buffer without a terminator, then finish the
        // line; the whole thing must vanish.
        for _ in 0..(INPUT_BUFFER_SIZE + 100) {
            link.push_bytes(b"x");
        }
        link.push_bytes(b"\n");
        link.push_line(r#"{"type":"stop","timestamp":1,"payload":{}}"#);

        let (commands, _) = drain(&mut transport, &mut link, 1_000);
        assert_eq!(commands.as_slice(), &[Command::Stop]);
    }

    #[test]
    fn first_activity_emits_connected() {
        let mut transport = Transport::new();
        let mut link = BufferLink::new();
        link.push_line(r#"{"type":"getState","timestamp":1,"payload":{}}"#);

        drain(&mut transport, &mut link, 1_000);
        transport.flush(&mut link);

        assert_eq!(link.count_of_type("connected"), 1);
        assert!(transport.is_active());
    }

    #[test]
    fn disconnect_fires_exactly_once() {
        let mut transport = Transport::new();
        let mut link = BufferLink::new();
        link.push_line(r#"{"type":"getState","timestamp":1,"payload":{}}"#);
        drain(&mut transport, &mut link, 1_000);

        // Quiet but within the timeout.
        let (_, disconnected) = drain(&mut transport, &mut link, 4_000);
        assert!(!disconnected);

        let (_, disconnected) = drain(&mut transport, &mut link, 6_100);
        assert!(disconnected);
        assert!(!transport.is_active());

        // Still silent: no second event.
        let (_, disconnected) = drain(&mut transport, &mut link, 60_000);
        assert!(!disconnected);
    }

    #[test]
    fn no_disconnect_without_prior_activity() {
        let mut transport = Transport::new();
        let mut link = BufferLink::new();

        let (_, disconnected) = drain(&mut transport, &mut link, 1_000_000);
        assert!(!disconnected);
    }

    #[test]
    fn activity_after_disconnect_reconnects() {
        let mut transport = Transport::new();
        let mut link = BufferLink::new();
        link.push_line(r#"{"type":"getState","timestamp":1,"payload":{}}"#);
        drain(&mut transport, &mut link, 1_000);
        drain(&mut transport, &mut link, 10_000);
        assert!(!transport.is_active());

        link.push_line(r#"{"type":"getState","timestamp":2,"payload":{}}"#);
        drain(&mut transport, &mut link, 11_000);
        assert!(transport.is_active());

        transport.flush(&mut link);
        assert_eq!(link.count_of_type("connected"), 2);
    }

    #[test]
    fn telemetry_cadence_is_one_hertz_while_active() {
        let mut transport = Transport::new();
        let mut link = BufferLink::new();

        // Inactive: never due.
        assert!(!transport.state_due(5_000));

        link.push_line(r#"{"type":"getState","timestamp":1,"payload":{}}"#);
        drain(&mut transport, &mut link, 6_000);

        assert!(transport.state_due(6_000));
        assert!(!transport.state_due(6_500));
        assert!(transport.state_due(7_000));
    }

    #[test]
    fn outbox_drops_oldest_when_full() {
        let mut transport = Transport::new();
        let mut link = BufferLink::new();

        for i in 0..12u32 {
            let mut message = JsonString::new();
            let _ = message.push_str("{\"type\":\"log\",\"n\":");
            let mut digits = heapless::String::<8>::new();
            let _ = core::fmt::write(&mut digits, format_args!("{}", i));
            let _ = message.push_str(&digits);
            let _ = message.push_str("}");
            transport.enqueue(message);
        }
        transport.flush(&mut link);

        // Depth is 8: the first four lines were displaced.
        assert_eq!(link.sent.len(), 8);
        assert!(link.sent.front().unwrap().contains("\"n\":4"));
        assert!(link.sent.back().unwrap().contains("\"n\":11"));
    }
}
