//! Desktop simulator for the airnode sensing loop.
//!
//! Wires the real [`SensingLoop`] to synthetic hardware: a scripted BMP180
//! register file seeded with the reference values from the Bosch
//! datasheet, slowly drifting gas and humidity channels, and a serial sink
//! that decodes each 20-byte frame exactly the way the paired receiver
//! does.
//!
//! Run with `RUST_LOG=info` for the per-cycle diagnostics and the decoded
//! receiver view.

use std::convert::Infallible;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorType, I2c, Operation};
use log::{error, info, warn};

use airnode_core::config::Config;
use airnode_core::payload::{FRAME_LEN, Payload};
use airnode_core::sampling::SensingLoop;
use airnode_core::sensors::AnalogSource;

/// Alert thresholds used by the paired mobile application, in ppm.
const CH4_ALERT_PPM: f32 = 100.0;
const CO_ALERT_PPM: f32 = 75.0;

const REG_CTRL_MEAS: usize = 0xF4;
const REG_OUT_MSB: usize = 0xF6;

// ---------------------------------------------------------------------------
// Simulated barometer
// ---------------------------------------------------------------------------

/// BMP180 register file with the datasheet calibration constants and raw
/// conversion results that wander a little around the reference values.
struct SimBaro {
    registers: [u8; 256],
    pointer: usize,
    conversions: u32,
}

impl SimBaro {
    fn new() -> Self {
        let mut baro = Self {
            registers: [0; 256],
            pointer: 0,
            conversions: 0,
        };
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

    fn wander(&self, swing: u16) -> u16 {
        // Small deterministic triangle wave around zero
        let phase = self.conversions % (u32::from(swing) * 2);
        phase.abs_diff(u32::from(swing)) as u16
    }

    fn start_conversion(&mut self, command: u8) {
        self.conversions += 1;
        if command == 0x2E {
            let ut = 27898 + self.wander(40);
            self.store_word(REG_OUT_MSB, ut);
        } else if command & 0x3F == 0x34 {
            let up = 23843 + self.wander(25);
            self.store_word(REG_OUT_MSB, up);
            self.registers[REG_OUT_MSB + 2] = 0;
        }
    }
}

impl ErrorType for SimBaro {
    type Error = Infallible;
}

impl I2c for SimBaro {
    fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Infallible> {
        for op in operations {
            match op {
                Operation::Write(bytes) => match *bytes {
                    [reg] => self.pointer = usize::from(*reg),
                    [reg, value] => {
                        let reg = usize::from(*reg);
                        if reg == REG_CTRL_MEAS {
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

// ---------------------------------------------------------------------------
// Simulated analog channels
// ---------------------------------------------------------------------------

/// Sinusoidal ADC channel around a midpoint. The first read happens at the
/// midpoint, which stands in for the clean-air baseline.
struct SimChannel {
    mid: f32,
    swing: f32,
    period_s: f32,
    elapsed_s: f32,
    step_s: f32,
}

impl SimChannel {
    fn new(mid: f32, swing: f32, period_s: f32, step_s: f32) -> Self {
        Self {
            mid,
            swing,
            period_s,
            elapsed_s: 0.0,
            step_s,
        }
    }
}

impl AnalogSource for SimChannel {
    type Error = Infallible;

    fn read_raw(&mut self) -> Result<u16, Infallible> {
        let angle = core::f32::consts::TAU * self.elapsed_s / self.period_s;
        self.elapsed_s += self.step_s;
        let raw = self.mid + self.swing * angle.sin();
        Ok(raw.clamp(0.0, 1023.0) as u16)
    }
}

// ---------------------------------------------------------------------------
// Simulated receiver
// ---------------------------------------------------------------------------

/// Serial sink that plays the paired receiver: buffers until at least one
/// full frame is available, then decodes big-endian fields and divides by
/// the wire scale factors.
struct ReceiverSink {
    pending: Vec<u8>,
}

impl ReceiverSink {
    fn new() -> Self {
        Self {
            pending: Vec::with_capacity(FRAME_LEN),
        }
    }
}

impl embedded_io::ErrorType for ReceiverSink {
    type Error = Infallible;
}

impl embedded_io::Write for ReceiverSink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        self.pending.extend_from_slice(buf);
        while self.pending.len() >= FRAME_LEN {
            let frame: [u8; FRAME_LEN] = self.pending[..FRAME_LEN]
                .try_into()
                .expect("slice length checked");
            self.pending.drain(..FRAME_LEN);

            let p = Payload::from_frame(&frame);
            let ch4_ppm = p.ch4 as f32 / 100.0;
            let co_ppm = p.co as f32 / 100.0;
            info!(
                "[receiver] T = {:.1} C, P = {:.2} hPa, CH4 = {:.2} ppm, CO = {:.2} ppm, RH = {:.2} %",
                p.temperature as f32 / 10.0,
                p.pressure as f32 / 100.0,
                ch4_ppm,
                co_ppm,
                p.humidity as f32 / 100.0,
            );
            if ch4_ppm >= CH4_ALERT_PPM || co_ppm >= CO_ALERT_PPM {
                warn!("[receiver] gas level alert: CH4 {ch4_ppm:.1} ppm, CO {co_ppm:.1} ppm");
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

struct WallClockDelay;

impl DelayNs for WallClockDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

fn main() {
    env_logger::init();

    let config = Config::default();
    let step_s = config.cycle_period_ms as f32 / 1000.0;

    // Gas channels idle near the clean-air baseline with a slow swell;
    // humidity sweeps a wider band.
    let ch4 = SimChannel::new(400.0, 60.0, 90.0, step_s);
    let co = SimChannel::new(300.0, 40.0, 150.0, step_s);
    let humidity = SimChannel::new(512.0, 120.0, 240.0, step_s);

    let mut cycle = match SensingLoop::init(
        &config,
        SimBaro::new(),
        ch4,
        co,
        humidity,
        ReceiverSink::new(),
        WallClockDelay,
    ) {
        Ok(cycle) => cycle,
        Err(e) => {
            // On the device this halts forever; a host process exits instead.
            error!("startup calibration failed: {e}");
            std::process::exit(1);
        }
    };

    info!("airnode simulator running, one frame per {} ms", config.cycle_period_ms);
    cycle.run()
}
