//! Hardware port.
//!
//! One trait gathers every register/pin access the core needs. Production
//! implements it on top of the board's SPI/ADC/PWM/GPIO peripherals; tests
//! and the simulator implement it in memory. All methods are expected to
//! complete promptly — the control loop never blocks on I/O.

/// The hardware boundary of the controller core.
pub trait Hardware {
    /// One 32-bit frame from the MAX31855 thermocouple amplifier.
    fn read_thermocouple_raw(&mut self) -> u32;

    /// One 10-bit sample from the heater-body thermistor ADC.
    fn read_thermistor_adc(&mut self) -> u16;

    /// Blower PWM duty, 0..255.
    fn set_fan_pwm(&mut self, duty: u8);

    /// Heater SSR control line.
    fn set_ssr(&mut self, on: bool);

    /// Monotonic milliseconds since boot. Never wraps within a session.
    fn now_ms(&self) -> u64;
}

/// Scriptable in-memory hardware used by the test suite.
///
/// Records the last actuator writes and replays whatever sensor values the
/// test loaded. Time only advances when the test says so.
#[cfg(any(test, feature = "std"))]
#[derive(Debug, Default)]
pub struct MockHardware {
    now_ms: u64,
    tc_frame: u32,
    adc: u16,
    pub fan_pwm: u8,
    pub ssr_on: bool,
    pub ssr_writes: u32,
}

#[cfg(any(test, feature = "std"))]
impl MockHardware {
    pub fn new() -> Self {
        let mut hw = Self::default();
        hw.now_ms = 1_000;
        hw.set_chamber_c(25.0);
        hw.set_heater_body_c(25.0);
        hw
    }

    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
    }

    /// Load a clean thermocouple frame for the given chamber temperature.
    pub fn set_chamber_c(&mut self, temp_c: f32) {
        self.tc_frame = crate::thermocouple::encode_frame(temp_c, crate::thermocouple::TcFault::empty());
    }

    /// Load a faulted thermocouple frame.
    pub fn set_tc_fault(&mut self, fault: crate::thermocouple::TcFault) {
        self.tc_frame = crate::thermocouple::encode_frame(0.0, fault);
    }

    /// Load a raw frame verbatim.
    pub fn set_tc_frame(&mut self, raw: u32) {
        self.tc_frame = raw;
    }

    /// Load the thermistor ADC so it converts to roughly the given
    /// heater-body temperature.
    pub fn set_heater_body_c(&mut self, temp_c: f32) {
        self.adc = crate::thermistor::adc_for_temp(temp_c);
    }

    pub fn set_thermistor_adc(&mut self, adc: u16) {
        self.adc = adc;
    }
}

#[cfg(any(test, feature = "std"))]
impl Hardware for MockHardware {
    fn read_thermocouple_raw(&mut self) -> u32 {
        self.tc_frame
    }

    fn read_thermistor_adc(&mut self) -> u16 {
        self.adc
    }

    fn set_fan_pwm(&mut self, duty: u8) {
        self.fan_pwm = duty;
    }

    fn set_ssr(&mut self, on: bool) {
        self.ssr_on = on;
        self.ssr_writes += 1;
    }

    fn now_ms(&self) -> u64 {
        self.now_ms
    }
}
