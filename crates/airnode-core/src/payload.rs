//! Fixed-layout telemetry frame codec.
//!
//! One frame per cycle, 20 bytes, five signed 32-bit fields:
//!
//! | Offset | Field       | Unit     |
//! |--------|-------------|----------|
//! | 0      | temperature | 0.1 °C   |
//! | 4      | pressure    | Pa       |
//! | 8      | ch4         | 0.01 ppm |
//! | 12     | co          | 0.01 ppm |
//! | 16     | humidity    | 0.01 %   |
//!
//! The receiver reads each field big-endian, so transmit order swaps the
//! byte order within each 4-byte field independently. The numeric view and
//! the transmit view never alias: converting consumes the payload.

use libm::roundf;

use crate::sensors::bmp180::Measurement;

/// Size of one telemetry frame on the wire.
pub const FRAME_LEN: usize = 20;

const FIELD_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    /// 0.1 °C steps.
    pub temperature: i32,
    /// Pa. Raw pascals on the wire; receivers divide by 100 for hPa.
    pub pressure: i32,
    /// 0.01 ppm steps.
    pub ch4: i32,
    /// 0.01 ppm steps.
    pub co: i32,
    /// 0.01 % steps.
    pub humidity: i32,
}

impl Payload {
    /// Scales physical readings into the fixed-point wire fields.
    pub fn from_readings(baro: Measurement, ch4_ppm: f32, co_ppm: f32, humidity_pct: f32) -> Self {
        Self {
            temperature: baro.temperature,
            pressure: baro.pressure,
            ch4: scale_centi(ch4_ppm),
            co: scale_centi(co_ppm),
            humidity: scale_centi(humidity_pct),
        }
    }

    /// Native little-endian byte view, fields in wire order.
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut bytes = [0u8; FRAME_LEN];
        for (slot, value) in bytes.chunks_exact_mut(FIELD_LEN).zip(self.fields()) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Inverse of [`Payload::to_bytes`].
    pub fn from_bytes(bytes: &[u8; FRAME_LEN]) -> Self {
        let mut fields = [0i32; 5];
        for (value, slot) in fields.iter_mut().zip(bytes.chunks_exact(FIELD_LEN)) {
            let mut raw = [0u8; FIELD_LEN];
            raw.copy_from_slice(slot);
            *value = i32::from_le_bytes(raw);
        }
        Self {
            temperature: fields[0],
            pressure: fields[1],
            ch4: fields[2],
            co: fields[3],
            humidity: fields[4],
        }
    }

    /// Converts to transmit order, consuming the payload.
    ///
    /// After the per-field swap the buffer is no longer a native numeric
    /// view; only the serial link should touch it. Applied exactly once,
    /// immediately before transmission.
    pub fn into_frame(self) -> Frame {
        let mut bytes = self.to_bytes();
        swap_field_order(&mut bytes);
        Frame(bytes)
    }

    /// Receiver-side decode of a transmitted frame.
    pub fn from_frame(frame: &[u8; FRAME_LEN]) -> Self {
        let mut bytes = *frame;
        swap_field_order(&mut bytes);
        Self::from_bytes(&bytes)
    }

    fn fields(&self) -> [i32; 5] {
        [
            self.temperature,
            self.pressure,
            self.ch4,
            self.co,
            self.humidity,
        ]
    }
}

fn scale_centi(value: f32) -> i32 {
    roundf(value * 100.0) as i32
}

/// Reverses byte order within each 4-byte field independently. The frame
/// as a whole is not reversed. Applying it twice restores the original
/// layout.
fn swap_field_order(bytes: &mut [u8; FRAME_LEN]) {
    for field in bytes.chunks_exact_mut(FIELD_LEN) {
        field.reverse();
    }
}

/// A payload committed to transmit order.
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    pub const fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}
