//! BMP180 barometric pressure and temperature driver.
//!
//! Register protocol and fixed-point compensation follow the Bosch
//! datasheet. The temperature stage produces the `b5` intermediate the
//! pressure stage consumes, so the two are only meaningful as a pair;
//! the driver exposes them together through [`Bmp180::measure`].

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::bus::{BusError, RegisterBus};
use crate::sensors::SensorError;

/// Factory 7-bit bus address of the device.
pub const DEVICE_ADDRESS: u8 = 0x77;

const REG_CALIBRATION: u8 = 0xAA;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_OUT_MSB: u8 = 0xF6;

const CMD_CONVERT_TEMPERATURE: u8 = 0x2E;
const CMD_CONVERT_PRESSURE: u8 = 0x34;

/// Settle delay for a temperature conversion, in milliseconds.
const TEMPERATURE_SETTLE_MS: u32 = 5;

/// Accuracy/latency trade-off selector for pressure conversion. Higher
/// settings average more inside the device at increased conversion
/// latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oversampling {
    #[default]
    UltraLowPower = 0,
    Standard = 1,
    HighResolution = 2,
    UltraHighResolution = 3,
}

impl Oversampling {
    /// Conversion settle time at this setting, in milliseconds.
    pub const fn settle_ms(self) -> u32 {
        match self {
            Self::UltraLowPower => 5,
            Self::Standard => 8,
            Self::HighResolution => 14,
            Self::UltraHighResolution => 26,
        }
    }

    const fn bits(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Oversampling {
    type Error = SensorError;

    fn try_from(value: u8) -> Result<Self, SensorError> {
        match value {
            0 => Ok(Self::UltraLowPower),
            1 => Ok(Self::Standard),
            2 => Ok(Self::HighResolution),
            3 => Ok(Self::UltraHighResolution),
            other => Err(SensorError::OversamplingRange(other)),
        }
    }
}

/// The eleven compensation coefficients from the device ROM. Read once at
/// startup and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationConstants {
    pub ac1: i16,
    pub ac2: i16,
    pub ac3: i16,
    pub ac4: u16,
    pub ac5: u16,
    pub ac6: u16,
    pub b1: i16,
    pub b2: i16,
    pub mb: i16,
    pub mc: i16,
    pub md: i16,
}

impl CalibrationConstants {
    /// Reads the coefficient ROM at `0xAA..=0xBF`.
    ///
    /// Any failure is fatal and must not be retried: every later
    /// computation is meaningless without the constants.
    pub fn load<I2C: I2c>(bus: &mut RegisterBus<I2C>) -> Result<Self, SensorError> {
        fn fatal(_: BusError) -> SensorError {
            SensorError::Calibration
        }
        Ok(Self {
            ac1: bus.read_i16(REG_CALIBRATION).map_err(fatal)?,
            ac2: bus.read_i16(0xAC).map_err(fatal)?,
            ac3: bus.read_i16(0xAE).map_err(fatal)?,
            ac4: bus.read_u16(0xB0).map_err(fatal)?,
            ac5: bus.read_u16(0xB2).map_err(fatal)?,
            ac6: bus.read_u16(0xB4).map_err(fatal)?,
            b1: bus.read_i16(0xB6).map_err(fatal)?,
            b2: bus.read_i16(0xB8).map_err(fatal)?,
            mb: bus.read_i16(0xBA).map_err(fatal)?,
            mc: bus.read_i16(0xBC).map_err(fatal)?,
            md: bus.read_i16(0xBE).map_err(fatal)?,
        })
    }
}

/// Compensated output of one paired conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// True temperature in 0.1 °C steps.
    pub temperature: i32,
    /// True pressure in Pa. The wire contract carries raw Pa, not hPa.
    pub pressure: i32,
}

pub struct Bmp180<I2C> {
    bus: RegisterBus<I2C>,
    calibration: CalibrationConstants,
    oversampling: Oversampling,
}

impl<I2C: I2c> Bmp180<I2C> {
    /// Opens the device and loads the calibration ROM. A load failure is
    /// fatal; callers stop instead of running uncalibrated.
    pub fn new(i2c: I2C, oversampling: Oversampling) -> Result<Self, SensorError> {
        let mut bus = RegisterBus::new(i2c, DEVICE_ADDRESS);
        let calibration = CalibrationConstants::load(&mut bus)?;
        Ok(Self {
            bus,
            calibration,
            oversampling,
        })
    }

    pub const fn calibration(&self) -> &CalibrationConstants {
        &self.calibration
    }

    pub const fn oversampling(&self) -> Oversampling {
        self.oversampling
    }

    /// Commands a temperature conversion and reads the 16-bit raw result.
    fn read_raw_temperature(&mut self, delay: &mut impl DelayNs) -> Result<i32, SensorError> {
        self.bus
            .write_register(REG_CTRL_MEAS, CMD_CONVERT_TEMPERATURE)
            .map_err(|source| SensorError::Bus {
                operation: "start temperature conversion",
                source,
            })?;
        delay.delay_ms(TEMPERATURE_SETTLE_MS);
        let raw = self
            .bus
            .read_u16(REG_OUT_MSB)
            .map_err(|source| SensorError::Bus {
                operation: "read temperature",
                source,
            })?;
        Ok(i32::from(raw))
    }

    /// Commands a pressure conversion at the configured oversampling and
    /// reads the 24-bit raw result, aligned to the selected precision.
    fn read_raw_pressure(&mut self, delay: &mut impl DelayNs) -> Result<i32, SensorError> {
        let oss = self.oversampling;
        self.bus
            .write_register(REG_CTRL_MEAS, CMD_CONVERT_PRESSURE | (oss.bits() << 6))
            .map_err(|source| SensorError::Bus {
                operation: "start pressure conversion",
                source,
            })?;
        delay.delay_ms(oss.settle_ms());
        let mut out = [0u8; 3];
        self.bus
            .read_bytes(REG_OUT_MSB, &mut out)
            .map_err(|source| SensorError::Bus {
                operation: "read pressure",
                source,
            })?;
        let wide = (u32::from(out[0]) << 16) | (u32::from(out[1]) << 8) | u32::from(out[2]);
        Ok((wide >> (8 - oss.bits())) as i32)
    }

    /// Runs one temperature conversion followed by one pressure conversion
    /// and compensates both.
    ///
    /// A failure anywhere aborts the whole pair; the caller skips the
    /// current cycle and retries on the next poll.
    pub fn measure(&mut self, delay: &mut impl DelayNs) -> Result<Measurement, SensorError> {
        let ut = self.read_raw_temperature(delay)?;
        let up = self.read_raw_pressure(delay)?;
        compensate(&self.calibration, ut, up, self.oversampling)
    }
}

/// Temperature compensation. Returns deci-degrees Celsius and the `b5`
/// intermediate consumed by the pressure stage of the same cycle.
///
/// An acknowledged but garbage raw value can zero the `x1 + md` divisor;
/// that reading is rejected instead of divided through.
fn true_temperature(cal: &CalibrationConstants, ut: i32) -> Result<(i32, i32), SensorError> {
    let x1 = (((i64::from(ut) - i64::from(cal.ac6)) * i64::from(cal.ac5)) >> 15) as i32;
    let divisor = x1 + i32::from(cal.md);
    if divisor == 0 {
        return Err(SensorError::Compensation);
    }
    let x2 = (i32::from(cal.mc) << 11) / divisor;
    let b5 = x1 + x2;
    Ok(((b5 + 8) >> 4, b5))
}

/// Pressure compensation per the datasheet polynomial, in Pa.
///
/// Products that can exceed 32 bits are widened to `i64` before the
/// shift; `b4` and `b7` are kept unsigned before their shifts exactly as
/// the reference formula requires. A `b4` of zero is rejected the same
/// way as the temperature pole.
fn true_pressure(
    cal: &CalibrationConstants,
    b5: i32,
    up: i32,
    oss: Oversampling,
) -> Result<i32, SensorError> {
    let b6 = b5 - 4000;
    let b6_sq = ((i64::from(b6) * i64::from(b6)) >> 12) as i32;

    let x1 = ((i64::from(cal.b2) * i64::from(b6_sq)) >> 11) as i32;
    let x2 = ((i64::from(cal.ac2) * i64::from(b6)) >> 11) as i32;
    let x3 = x1 + x2;
    let b3 = (((i32::from(cal.ac1) * 4 + x3) << oss.bits()) + 2) / 4;

    let x1 = ((i64::from(cal.ac3) * i64::from(b6)) >> 13) as i32;
    let x2 = ((i64::from(cal.b1) * i64::from(b6_sq)) >> 16) as i32;
    let x3 = ((x1 + x2) + 2) >> 2;
    let b4 = ((u64::from(cal.ac4) * u64::from((x3 + 32768) as u32)) >> 15) as u32;
    if b4 == 0 {
        return Err(SensorError::Compensation);
    }
    let b7 = u64::from((up as u32).wrapping_sub(b3 as u32)) * u64::from(50000u32 >> oss.bits());

    let p = if b7 < 0x8000_0000 {
        ((b7 * 2) / u64::from(b4)) as i32
    } else {
        ((b7 / u64::from(b4)) * 2) as i32
    };

    let x1 = (p >> 8) * (p >> 8);
    let x1 = (x1 * 3038) >> 16;
    let x2 = (-7357 * p) >> 16;
    Ok(p + ((x1 + x2 + 3791) >> 4))
}

/// Runs both compensation stages on a raw pair from one cycle.
fn compensate(
    cal: &CalibrationConstants,
    ut: i32,
    up: i32,
    oss: Oversampling,
) -> Result<Measurement, SensorError> {
    let (temperature, b5) = true_temperature(cal, ut)?;
    let pressure = true_pressure(cal, b5, up, oss)?;
    Ok(Measurement {
        temperature,
        pressure,
    })
}
