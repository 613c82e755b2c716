//! Relative humidity sampling.
//!
//! Same moving-average window and warm-up discipline as the gas channels,
//! but the averaged raw code maps linearly to a percentage; there is no
//! resistance math and no baseline to calibrate.

use log::error;

use crate::config::AdcConfig;
use crate::sensors::{AnalogSource, SampleWindow, SensorError};

/// One appended sample and the smoothed percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumidityReading {
    /// Raw ADC code appended by this call.
    pub raw: u16,
    /// Moving average of the raw window after the append.
    pub averaged: f32,
    /// Smoothed relative humidity in percent.
    pub percent: f32,
}

pub struct HumiditySensor<A> {
    source: A,
    adc: AdcConfig,
    window: SampleWindow,
}

impl<A: AnalogSource> HumiditySensor<A> {
    pub const fn new(source: A, adc: AdcConfig) -> Self {
        Self {
            source,
            adc,
            window: SampleWindow::new(),
        }
    }

    pub fn warmed_up(&self) -> bool {
        self.window.warmed_up()
    }

    pub fn fill(&self) -> usize {
        self.window.fill()
    }

    /// Appends one raw sample and computes the smoothed percentage.
    pub fn sample(&mut self) -> Result<HumidityReading, SensorError> {
        let raw = self.source.read_raw().map_err(|e| {
            error!("humidity read failed: {e:?}");
            SensorError::AnalogRead { sensor: "humidity" }
        })?;
        let averaged = self.window.push_and_average(raw);
        let percent = averaged * 100.0 / f32::from(self.adc.full_scale);
        Ok(HumidityReading {
            raw,
            averaged,
            percent,
        })
    }
}
