//! MQ-series gas concentration sampling.
//!
//! Each channel keeps a moving-average window of raw ADC codes. A sample
//! converts the averaged code to a voltage, derives the sensor resistance
//! through the divider relation, ratios it against the clean-air baseline
//! `r0` and applies the gas-specific power-law curve.

use libm::powf;
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::config::{AdcConfig, GasConfig};
use crate::sensors::{AnalogSource, SampleWindow, SensorError};

/// Which gas a sensor channel measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasKind {
    Ch4,
    Co,
}

impl GasKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ch4 => "CH4",
            Self::Co => "CO",
        }
    }

    const fn sensor_name(self) -> &'static str {
        match self {
            Self::Ch4 => "MQ-4",
            Self::Co => "MQ-7",
        }
    }
}

/// Power-law sensitivity curve: `ppm = a * ratio^b`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GasCurve {
    pub a: f32,
    pub b: f32,
}

/// One appended sample and the values derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasReading {
    /// Raw ADC code appended by this call.
    pub raw: u16,
    /// Moving average of the raw window after the append.
    pub averaged: f32,
    /// Smoothed concentration in ppm.
    pub ppm: f32,
}

pub struct GasSensor<A> {
    source: A,
    kind: GasKind,
    curve: GasCurve,
    load_kohm: f32,
    adc: AdcConfig,
    /// Baseline resistance in kΩ. Write-once at calibration.
    r0: f32,
    window: SampleWindow,
}

impl<A: AnalogSource> GasSensor<A> {
    /// Reads the channel once under the clean-air assumption and fixes the
    /// baseline `r0` for the life of the sensor.
    ///
    /// Air that is not clean at boot skews every later ratio; this is a
    /// known limitation of the single-shot baseline, not corrected in
    /// software.
    pub fn calibrate(
        mut source: A,
        kind: GasKind,
        config: &GasConfig,
        adc: AdcConfig,
    ) -> Result<Self, SensorError> {
        let raw = source.read_raw().map_err(|e| {
            error!("{} baseline read failed: {e:?}", kind.sensor_name());
            SensorError::Calibration
        })?;
        let rs = sensor_resistance(f32::from(raw), &adc, config.load_kohm);
        let r0 = rs / config.clean_air_ratio;
        debug!("{} baseline r0 = {r0:.3} kOhm (raw {raw})", kind.sensor_name());
        Ok(Self {
            source,
            kind,
            curve: config.curve,
            load_kohm: config.load_kohm,
            adc,
            r0,
            window: SampleWindow::new(),
        })
    }

    pub const fn kind(&self) -> GasKind {
        self.kind
    }

    pub const fn r0(&self) -> f32 {
        self.r0
    }

    pub fn warmed_up(&self) -> bool {
        self.window.warmed_up()
    }

    /// Number of samples currently in the window.
    pub fn fill(&self) -> usize {
        self.window.fill()
    }

    /// Appends one raw sample and computes the smoothed concentration.
    ///
    /// Exactly one append per call; a failed read appends nothing.
    pub fn sample(&mut self) -> Result<GasReading, SensorError> {
        let raw = self.source.read_raw().map_err(|e| {
            error!("{} read failed: {e:?}", self.kind.sensor_name());
            SensorError::AnalogRead {
                sensor: self.kind.sensor_name(),
            }
        })?;
        let averaged = self.window.push_and_average(raw);
        let rs = sensor_resistance(averaged, &self.adc, self.load_kohm);
        let ratio = rs / self.r0;
        let ppm = self.curve.a * powf(ratio, self.curve.b);
        Ok(GasReading { raw, averaged, ppm })
    }
}

/// Divider relation with the load resistor between the sense line and
/// ground: `rs = (vref - v) * rl / v`.
fn sensor_resistance(raw: f32, adc: &AdcConfig, load_kohm: f32) -> f32 {
    let v = adc.to_volts(raw);
    (adc.vref - v) * load_kohm / v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SAMPLE_WINDOW;

    struct ScriptedSource {
        values: &'static [u16],
        at: usize,
    }

    impl ScriptedSource {
        fn new(values: &'static [u16]) -> Self {
            Self { values, at: 0 }
        }
    }

    impl AnalogSource for ScriptedSource {
        type Error = core::convert::Infallible;

        fn read_raw(&mut self) -> Result<u16, Self::Error> {
            let v = self.values[self.at % self.values.len()];
            self.at += 1;
            Ok(v)
        }
    }

    #[derive(Debug)]
    struct ConversionFault;

    struct FailingSource;

    impl AnalogSource for FailingSource {
        type Error = ConversionFault;

        fn read_raw(&mut self) -> Result<u16, Self::Error> {
            Err(ConversionFault)
        }
    }

    fn unity_config() -> GasConfig {
        // clean_air_ratio of 1 makes r0 equal the clean-air resistance, so
        // a constant input keeps the ratio at exactly 1.
        GasConfig {
            curve: GasCurve { a: 99.042, b: -1.518 },
            load_kohm: 10.0,
            clean_air_ratio: 1.0,
        }
    }

    #[test]
    fn one_call_is_one_append() {
        let source = ScriptedSource::new(&[512]);
        let mut sensor =
            GasSensor::calibrate(source, GasKind::Co, &unity_config(), AdcConfig::default())
                .unwrap();
        for expected_fill in 1..SAMPLE_WINDOW {
            sensor.sample().unwrap();
            assert_eq!(sensor.fill(), expected_fill);
            assert!(!sensor.warmed_up());
        }
        sensor.sample().unwrap();
        assert!(sensor.warmed_up());
    }

    #[test]
    fn constant_input_yields_curve_coefficient() {
        // ratio pinned at 1, so ppm == a regardless of the exponent
        let source = ScriptedSource::new(&[512]);
        let mut sensor =
            GasSensor::calibrate(source, GasKind::Co, &unity_config(), AdcConfig::default())
                .unwrap();
        let reading = sensor.sample().unwrap();
        assert_eq!(reading.raw, 512);
        assert!(libm::fabsf(reading.ppm - 99.042) < 1e-3);
    }

    #[test]
    fn average_uses_fill_count_during_warm_up() {
        // First value calibrates; the window then sees 100, 200, 300
        let source = ScriptedSource::new(&[512, 100, 200, 300]);
        let mut sensor =
            GasSensor::calibrate(source, GasKind::Ch4, &unity_config(), AdcConfig::default())
                .unwrap();
        assert_eq!(sensor.sample().unwrap().averaged, 100.0);
        assert_eq!(sensor.sample().unwrap().averaged, 150.0);
        assert_eq!(sensor.sample().unwrap().averaged, 200.0);
    }

    #[test]
    fn baseline_read_failure_is_fatal() {
        let result = GasSensor::calibrate(
            FailingSource,
            GasKind::Co,
            &unity_config(),
            AdcConfig::default(),
        );
        assert!(matches!(result, Err(SensorError::Calibration)));
    }

    #[test]
    fn failed_read_appends_nothing() {
        let mut sensor = GasSensor {
            source: FailingSource,
            kind: GasKind::Co,
            curve: GasCurve { a: 1.0, b: 1.0 },
            load_kohm: 10.0,
            adc: AdcConfig::default(),
            r0: 1.0,
            window: SampleWindow::new(),
        };
        assert!(matches!(
            sensor.sample(),
            Err(SensorError::AnalogRead { sensor: "MQ-7" })
        ));
        assert_eq!(sensor.fill(), 0);
    }

    #[test]
    fn gas_kinds_are_labelled() {
        assert_eq!(GasKind::Ch4.label(), "CH4");
        assert_eq!(GasKind::Co.label(), "CO");
    }
}
