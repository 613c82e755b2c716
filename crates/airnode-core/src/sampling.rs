//! Cooperative sensing loop.
//!
//! Single-threaded, run-to-completion cycles: barometric measurement,
//! gas and humidity sampling, the per-cycle diagnostic report, frame
//! assembly and transmission, then a fixed inter-cycle delay. Sensor
//! failures are logged and self-heal on the next poll; nothing in the
//! loop crashes it.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use embedded_io::Write;
use log::{error, info, warn};

use crate::config::Config;
use crate::payload::Payload;
use crate::sensors::bmp180::{Bmp180, Measurement, Oversampling};
use crate::sensors::gas::{GasKind, GasReading, GasSensor};
use crate::sensors::humidity::{HumidityReading, HumiditySensor};
use crate::sensors::{AnalogSource, SensorError};

/// Everything one cycle produced.
///
/// The frame is withheld unless every field computed: the fixed wire
/// layout has no representation for a partial payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOutcome {
    pub baro: Option<Measurement>,
    pub ch4: Option<GasReading>,
    pub co: Option<GasReading>,
    pub humidity: Option<HumidityReading>,
    pub transmitted: bool,
}

/// Owns and threads all sensor state explicitly; no ambient globals.
pub struct SensingLoop<I2C, CH4, CO, HUM, TX, D> {
    baro: Bmp180<I2C>,
    ch4: GasSensor<CH4>,
    co: GasSensor<CO>,
    humidity: HumiditySensor<HUM>,
    tx: TX,
    delay: D,
    period_ms: u32,
}

impl<I2C, CH4, CO, HUM, TX, D> SensingLoop<I2C, CH4, CO, HUM, TX, D>
where
    I2C: I2c,
    CH4: AnalogSource,
    CO: AnalogSource,
    HUM: AnalogSource,
    TX: Write,
    D: DelayNs,
{
    /// Brings up every sensor: loads the barometer calibration ROM and
    /// fixes both gas baselines under the clean-air assumption.
    ///
    /// A calibration failure here is fatal. The device binary halts
    /// forever on it; downstream computation is meaningless without the
    /// constants.
    pub fn init(
        config: &Config,
        i2c: I2C,
        ch4: CH4,
        co: CO,
        humidity: HUM,
        tx: TX,
        delay: D,
    ) -> Result<Self, SensorError> {
        let oversampling = Oversampling::try_from(config.oversampling)?;
        let baro = Bmp180::new(i2c, oversampling)?;
        let ch4 = GasSensor::calibrate(ch4, GasKind::Ch4, &config.ch4, config.adc)?;
        let co = GasSensor::calibrate(co, GasKind::Co, &config.co, config.adc)?;
        let humidity = HumiditySensor::new(humidity, config.adc);
        info!(
            "sensors up: CH4 r0 = {:.3} kOhm, CO r0 = {:.3} kOhm",
            ch4.r0(),
            co.r0()
        );
        Ok(Self {
            baro,
            ch4,
            co,
            humidity,
            tx,
            delay,
            period_ms: config.cycle_period_ms,
        })
    }

    /// One run-to-completion cycle.
    ///
    /// A barometer failure does not stop the gas and humidity sampling or
    /// their diagnostics; it only suppresses the frame, since an invalid
    /// temperature/pressure pair must never reach the receiver.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let baro = match self.baro.measure(&mut self.delay) {
            Ok(m) => {
                info!("temperature: {:.1} C", m.temperature as f32 / 10.0);
                // hPa here is display-only; the wire carries raw Pa
                info!("pressure: {:.2} hPa", m.pressure as f32 / 100.0);
                Some(m)
            }
            Err(e) => {
                error!("barometer cycle failed: {e}");
                None
            }
        };

        let ch4 = sample_gas(&mut self.ch4);
        let co = sample_gas(&mut self.co);
        let humidity = match self.humidity.sample() {
            Ok(r) => {
                info!("humidity: {:.2} %", r.percent);
                Some(r)
            }
            Err(e) => {
                error!("humidity sample failed: {e}");
                None
            }
        };

        let transmitted = match (baro, ch4, co, humidity) {
            (Some(b), Some(methane), Some(monoxide), Some(rh)) => {
                self.transmit(Payload::from_readings(
                    b,
                    methane.ppm,
                    monoxide.ppm,
                    rh.percent,
                ))
            }
            _ => {
                warn!("cycle incomplete, frame withheld");
                false
            }
        };

        CycleOutcome {
            baro,
            ch4,
            co,
            humidity,
            transmitted,
        }
    }

    fn transmit(&mut self, payload: Payload) -> bool {
        let frame = payload.into_frame();
        match self.tx.write_all(frame.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                error!("frame transmission failed: {e:?}");
                false
            }
        }
    }

    /// Runs forever at the configured period. No backoff, no rate
    /// adaptation; transient failures are retried by the next cycle.
    pub fn run(&mut self) -> ! {
        loop {
            self.run_cycle();
            self.delay.delay_ms(self.period_ms);
        }
    }
}

fn sample_gas<A: AnalogSource>(sensor: &mut GasSensor<A>) -> Option<GasReading> {
    match sensor.sample() {
        Ok(r) => {
            info!(
                "{}: {:.2} ppm (avg raw {:.1}{})",
                sensor.kind().label(),
                r.ppm,
                r.averaged,
                if sensor.warmed_up() {
                    ""
                } else {
                    ", warming up"
                }
            );
            Some(r)
        }
        Err(e) => {
            error!("{} sample failed: {e}", sensor.kind().label());
            None
        }
    }
}
