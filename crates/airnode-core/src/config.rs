//! Node configuration.
//!
//! Everything the sensing loop needs that is not hardware wiring: cycle
//! timing, the pressure oversampling setting, the ADC transfer parameters,
//! and the per-gas calibration curves.

use serde::{Deserialize, Serialize};

use crate::sensors::gas::GasCurve;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Inter-cycle throttle delay in milliseconds.
    pub cycle_period_ms: u32,
    /// Pressure oversampling setting, 0-3.
    pub oversampling: u8,
    pub adc: AdcConfig,
    pub ch4: GasConfig,
    pub co: GasConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cycle_period_ms: 1000,
            oversampling: 0,
            adc: AdcConfig::default(),
            // MQ-4 and MQ-7 log-log sensitivity curves
            ch4: GasConfig {
                curve: GasCurve {
                    a: 1012.7,
                    b: -2.786,
                },
                load_kohm: 10.0,
                clean_air_ratio: 4.4,
            },
            co: GasConfig {
                curve: GasCurve {
                    a: 99.042,
                    b: -1.518,
                },
                load_kohm: 10.0,
                clean_air_ratio: 27.5,
            },
        }
    }
}

/// Transfer parameters of the analog converter feeding the gas and
/// humidity channels.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AdcConfig {
    /// Reference voltage at full scale, in volts.
    pub vref: f32,
    /// Highest raw code the converter produces (1023 for 10 bits).
    pub full_scale: u16,
}

impl AdcConfig {
    /// Linear map from a raw code to volts over the full-scale range.
    pub fn to_volts(&self, raw: f32) -> f32 {
        raw * self.vref / f32::from(self.full_scale)
    }
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            vref: 5.0,
            full_scale: 1023,
        }
    }
}

/// Calibration for one gas channel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GasConfig {
    /// Power-law sensitivity curve for this gas.
    pub curve: GasCurve,
    /// Load resistance in the measurement divider, in kΩ.
    pub load_kohm: f32,
    /// Rs/R0 the sensor exhibits in clean air.
    pub clean_air_ratio: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adc_transfer_spans_full_scale() {
        let adc = AdcConfig::default();
        assert_eq!(adc.to_volts(0.0), 0.0);
        assert_eq!(adc.to_volts(1023.0), 5.0);
        let mid = adc.to_volts(511.5);
        assert!(libm::fabsf(mid - 2.5) < 1e-4);
    }
}
