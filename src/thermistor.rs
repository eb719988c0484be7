//! Heater-body NTC thermistor.
//!
//! The thermistor sits on the heater casting as an independent check on the
//! chamber probe. Circuit: 5 V — NTC — ADC node — 100 kΩ — GND, sampled by
//! a 10-bit ADC and converted with the Beta equation.

use libm::{expf, logf};

use crate::config::{
    THERMISTOR_BETA, THERMISTOR_R0, THERMISTOR_R1, THERMISTOR_T0_K, THERMISTOR_VCC,
};
use crate::hal::Hardware;

const ADC_FULL_SCALE: f32 = 1023.0;
const KELVIN_OFFSET: f32 = 273.15;

/// Returned when the divider geometry is impossible (shorted or floating
/// input). Reads as "impossibly hot" so the safety layer fails safe.
pub const SENSOR_FAULT_C: f32 = 999.0;

/// Convert one raw ADC sample to °C.
pub fn convert(adc: u16) -> f32 {
    if adc == 0 {
        return SENSOR_FAULT_C;
    }

    let voltage = (adc as f32 / ADC_FULL_SCALE) * THERMISTOR_VCC;
    if voltage <= 0.0 {
        return SENSOR_FAULT_C;
    }

    let resistance = THERMISTOR_R1 * (THERMISTOR_VCC / voltage - 1.0);
    if resistance <= 0.0 {
        return SENSOR_FAULT_C;
    }

    let temp_k =
        1.0 / (1.0 / THERMISTOR_T0_K + (1.0 / THERMISTOR_BETA) * logf(resistance / THERMISTOR_R0));
    temp_k - KELVIN_OFFSET
}

/// Read and convert in one step.
pub fn read_celsius<H: Hardware>(hw: &mut H) -> f32 {
    convert(hw.read_thermistor_adc())
}

/// Inverse of [`convert`]: the ADC count that reads back as roughly the
/// given temperature. Used by the simulator and the test mock.
pub fn adc_for_temp(temp_c: f32) -> u16 {
    let temp_k = temp_c + KELVIN_OFFSET;
    let resistance =
        THERMISTOR_R0 * expf(THERMISTOR_BETA * (1.0 / temp_k - 1.0 / THERMISTOR_T0_K));
    let adc = ADC_FULL_SCALE * THERMISTOR_R1 / (THERMISTOR_R1 + resistance);
    adc as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_point_reads_room_temperature() {
        // At 25 °C the NTC equals the fixed resistor, so the node sits at
        // half scale.
        let t = convert(512);
        assert!((t - 25.0).abs() < 0.5, "got {t}");
    }

    #[test]
    fn zero_adc_is_sentinel() {
        assert_eq!(convert(0), SENSOR_FAULT_C);
    }

    #[test]
    fn full_scale_adc_is_sentinel() {
        // Full scale puts zero volts across the NTC: impossible geometry.
        assert_eq!(convert(1023), SENSOR_FAULT_C);
    }

    #[test]
    fn monotonic_in_adc() {
        // Hotter NTC -> lower resistance -> higher node voltage -> higher ADC.
        let mut prev = convert(100);
        for adc in (150u16..1000).step_by(50) {
            let t = convert(adc);
            assert!(t > prev, "adc {adc}: {t} <= {prev}");
            prev = t;
        }
    }

    #[test]
    fn inverse_round_trips() {
        // Above ~150 °C the divider runs out of ADC resolution, so the
        // round trip is only checked where the curve is still steep.
        for target in [25.0f32, 60.0, 120.0, 150.0] {
            let adc = adc_for_temp(target);
            let back = convert(adc);
            assert!((back - target).abs() < 2.0, "{target} -> {adc} -> {back}");
        }
    }
}
