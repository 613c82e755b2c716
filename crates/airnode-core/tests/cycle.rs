//! Full sensing-cycle tests against scripted hardware.
//!
//! The scripted barometer serves the calibration constants and raw
//! conversion results from the worked example in the Bosch datasheet, so
//! the transmitted frame has known reference contents.

use airnode_core::config::Config;
use airnode_core::payload::{FRAME_LEN, Payload};
use airnode_core::sampling::SensingLoop;
use airnode_core::sensors::{AnalogSource, SensorError};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{
    self, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation,
};

const REG_CTRL_MEAS: usize = 0xF4;
const REG_OUT_MSB: usize = 0xF6;

#[derive(Debug)]
struct Nack;

impl i2c::Error for Nack {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }
}

/// BMP180 register file preloaded with the datasheet reference values.
struct ScriptedBaro {
    registers: [u8; 256],
    pointer: usize,
    /// Reject every transaction, including the calibration load.
    dead: bool,
    /// Reject conversion commands only; calibration still loads.
    fail_conversions: bool,
    /// Raw temperature served for every conversion.
    ut: u16,
}

impl ScriptedBaro {
    fn new() -> Self {
        let mut baro = Self {
            registers: [0; 256],
            pointer: 0,
            dead: false,
            fail_conversions: false,
            ut: 27898,
        };
        // Calibration ROM, 0xAA..=0xBF
        baro.store_word(0xAA, 408i16 as u16); // ac1
        baro.store_word(0xAC, -72i16 as u16); // ac2
        baro.store_word(0xAE, -14383i16 as u16); // ac3
        baro.store_word(0xB0, 32741); // ac4
        baro.store_word(0xB2, 32757); // ac5
        baro.store_word(0xB4, 23153); // ac6
        baro.store_word(0xB6, 6190); // b1
        baro.store_word(0xB8, 4); // b2
        baro.store_word(0xBA, -32768i16 as u16); // mb
        baro.store_word(0xBC, -8711i16 as u16); // mc
        baro.store_word(0xBE, 2868); // md
        baro
    }

    fn store_word(&mut self, reg: usize, value: u16) {
        let bytes = value.to_be_bytes();
        self.registers[reg] = bytes[0];
        self.registers[reg + 1] = bytes[1];
    }

    fn start_conversion(&mut self, command: u8) {
        if command == 0x2E {
            let ut = self.ut;
            self.store_word(REG_OUT_MSB, ut);
        } else if command & 0x3F == 0x34 {
            // 24-bit read, right-shifted by 8 at oss 0: up = 23843
            self.store_word(REG_OUT_MSB, 23843);
            self.registers[REG_OUT_MSB + 2] = 0;
        }
    }
}

impl ErrorType for ScriptedBaro {
    type Error = Nack;
}

impl I2c for ScriptedBaro {
    fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Nack> {
        if self.dead {
            return Err(Nack);
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => match *bytes {
                    [reg] => self.pointer = usize::from(*reg),
                    [reg, value] => {
                        let reg = usize::from(*reg);
                        if reg == REG_CTRL_MEAS {
                            if self.fail_conversions {
                                return Err(Nack);
                            }
                            self.start_conversion(*value);
                        }
                        self.registers[reg] = *value;
                        self.pointer = reg;
                    }
                    _ => {}
                },
                Operation::Read(buf) => {
                    for (i, slot) in buf.iter_mut().enumerate() {
                        *slot = self.registers[self.pointer + i];
                    }
                }
            }
        }
        Ok(())
    }
}

struct FixedSource(u16);

impl AnalogSource for FixedSource {
    type Error = core::convert::Infallible;

    fn read_raw(&mut self) -> Result<u16, Self::Error> {
        Ok(self.0)
    }
}

struct NoopDelay;

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Expected centi-ppm for a channel whose input never moved off the
/// clean-air baseline: the ratio is pinned at the clean-air ratio.
fn resting_centi_ppm(a: f32, b: f32, clean_air_ratio: f32) -> i32 {
    libm::roundf(a * libm::powf(clean_air_ratio, b) * 100.0) as i32
}

#[test]
fn end_to_end_frame_matches_datasheet_example() {
    let config = Config::default();
    let mut wire: Vec<u8> = Vec::new();
    {
        let mut cycle = SensingLoop::init(
            &config,
            ScriptedBaro::new(),
            FixedSource(512),
            FixedSource(512),
            FixedSource(512),
            &mut wire,
            NoopDelay,
        )
        .expect("startup calibration");
        let outcome = cycle.run_cycle();
        assert!(outcome.transmitted);
        assert_eq!(outcome.baro.unwrap().temperature, 150);
        assert_eq!(outcome.baro.unwrap().pressure, 69964);
    }

    assert_eq!(wire.len(), FRAME_LEN);
    let frame: [u8; FRAME_LEN] = wire.as_slice().try_into().unwrap();

    // Receiver-native byte order: temperature field reads big-endian
    assert_eq!(&frame[..4], &150i32.to_be_bytes());
    assert_eq!(&frame[4..8], &69964i32.to_be_bytes());

    let decoded = Payload::from_frame(&frame);
    assert_eq!(decoded.temperature, 150); // 15.0 °C
    assert_eq!(decoded.pressure, 69964); // Pa, not hPa
    assert_eq!(decoded.humidity, 5005); // 512/1023 of full scale

    let ch4 = resting_centi_ppm(config.ch4.curve.a, config.ch4.curve.b, config.ch4.clean_air_ratio);
    let co = resting_centi_ppm(config.co.curve.a, config.co.curve.b, config.co.clean_air_ratio);
    assert!((decoded.ch4 - ch4).abs() <= 1);
    assert!((decoded.co - co).abs() <= 1);
}

#[test]
fn two_cycles_emit_two_frames() {
    let config = Config::default();
    let mut wire: Vec<u8> = Vec::new();
    {
        let mut cycle = SensingLoop::init(
            &config,
            ScriptedBaro::new(),
            FixedSource(512),
            FixedSource(512),
            FixedSource(512),
            &mut wire,
            NoopDelay,
        )
        .expect("startup calibration");
        assert!(cycle.run_cycle().transmitted);
        assert!(cycle.run_cycle().transmitted);
    }
    assert_eq!(wire.len(), 2 * FRAME_LEN);
    // Identical inputs produce identical frames
    assert_eq!(wire[..FRAME_LEN], wire[FRAME_LEN..]);
}

#[test]
fn baro_failure_suppresses_frame_but_not_diagnostics() {
    let config = Config::default();
    let mut baro = ScriptedBaro::new();
    baro.fail_conversions = true;
    let mut wire: Vec<u8> = Vec::new();
    {
        let mut cycle = SensingLoop::init(
            &config,
            baro,
            FixedSource(512),
            FixedSource(512),
            FixedSource(512),
            &mut wire,
            NoopDelay,
        )
        .expect("calibration loads before conversions fail");
        let outcome = cycle.run_cycle();
        assert!(outcome.baro.is_none());
        // Gas and humidity still sampled this cycle
        assert!(outcome.ch4.is_some());
        assert!(outcome.co.is_some());
        assert!(outcome.humidity.is_some());
        assert!(!outcome.transmitted);
    }
    assert!(wire.is_empty());
}

#[test]
fn compensation_pole_suppresses_frame_without_panicking() {
    // ut = 20285 lands on the zero of the temperature divisor with the
    // reference constants. The cycle must treat it like any other failed
    // reading and carry on.
    let config = Config::default();
    let mut baro = ScriptedBaro::new();
    baro.ut = 20285;
    let mut wire: Vec<u8> = Vec::new();
    {
        let mut cycle = SensingLoop::init(
            &config,
            baro,
            FixedSource(512),
            FixedSource(512),
            FixedSource(512),
            &mut wire,
            NoopDelay,
        )
        .expect("startup calibration");
        let outcome = cycle.run_cycle();
        assert!(outcome.baro.is_none());
        assert!(!outcome.transmitted);
    }
    assert!(wire.is_empty());
}

#[test]
fn dead_bus_at_startup_is_fatal() {
    let config = Config::default();
    let mut baro = ScriptedBaro::new();
    baro.dead = true;
    let result = SensingLoop::init(
        &config,
        baro,
        FixedSource(512),
        FixedSource(512),
        FixedSource(512),
        Vec::<u8>::new(),
        NoopDelay,
    );
    assert!(matches!(result, Err(SensorError::Calibration)));
}

#[test]
fn out_of_range_oversampling_is_rejected_at_init() {
    let config = Config {
        oversampling: 4,
        ..Config::default()
    };
    let result = SensingLoop::init(
        &config,
        ScriptedBaro::new(),
        FixedSource(512),
        FixedSource(512),
        FixedSource(512),
        Vec::<u8>::new(),
        NoopDelay,
    );
    assert!(matches!(result, Err(SensorError::OversamplingRange(4))));
}
