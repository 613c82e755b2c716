//! Sensor drivers and shared sampling state.

pub mod bmp180;
pub mod gas;
pub mod humidity;

use heapless::Vec;
use thiserror_no_std::Error;

use crate::bus::BusError;

/// Number of raw samples in each sensor's moving-average window.
pub const SAMPLE_WINDOW: usize = 10;

/// Seam for one analog input channel.
///
/// The core never talks to an ADC peripheral directly; firmware and the
/// simulator provide implementations of this trait per wired channel.
pub trait AnalogSource {
    type Error: core::fmt::Debug;

    /// Converts once and returns the raw code.
    fn read_raw(&mut self) -> Result<u16, Self::Error>;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// A bus transaction failed. Recoverable: the affected computation is
    /// skipped for the current cycle and retried on the next poll.
    #[error("bus failure while trying to {operation}: {source}")]
    Bus {
        operation: &'static str,
        source: BusError,
    },
    /// Startup calibration could not be read. Fatal: measurements are
    /// meaningless without it, so there is no recovery path.
    #[error("calibration constants could not be loaded")]
    Calibration,
    /// Caller requested an oversampling setting outside 0-3.
    #[error("oversampling setting {0} out of range (0-3)")]
    OversamplingRange(u8),
    /// The analog channel for the named sensor failed to convert.
    #[error("analog read failed for {sensor}")]
    AnalogRead { sensor: &'static str },
    /// A raw conversion landed on a pole of the compensation arithmetic.
    /// Recoverable: the reading is discarded and the next poll retries.
    #[error("raw reading outside the compensable range")]
    Compensation,
}

/// Fixed-capacity moving-average window over raw ADC samples.
///
/// While warming up the average divides by the fill count instead of the
/// capacity, so the first cycles are not biased toward zero. Once the
/// write index has wrapped the buffer once, the window stays full and the
/// divisor is the capacity forever after.
#[derive(Debug)]
pub struct SampleWindow {
    samples: Vec<u16, SAMPLE_WINDOW>,
    write_at: usize,
}

impl SampleWindow {
    pub const fn new() -> Self {
        Self {
            samples: Vec::new(),
            write_at: 0,
        }
    }

    /// Appends one raw sample and returns the updated average.
    ///
    /// One call is exactly one append; there is no way to recompute the
    /// average without feeding a new sample.
    pub fn push_and_average(&mut self, raw: u16) -> f32 {
        if self.samples.is_full() {
            self.samples[self.write_at] = raw;
        } else {
            let _ = self.samples.push(raw);
        }
        self.write_at = (self.write_at + 1) % SAMPLE_WINDOW;
        let sum: u32 = self.samples.iter().map(|&s| u32::from(s)).sum();
        sum as f32 / self.samples.len() as f32
    }

    /// True once the window has been fully populated at least once.
    pub fn warmed_up(&self) -> bool {
        self.samples.is_full()
    }

    /// Current number of samples held, capped at the capacity.
    pub fn fill(&self) -> usize {
        self.samples.len()
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warm_up_divides_by_fill_count() {
        let mut window = SampleWindow::new();
        // k samples of value 100*k: average after k is the mean of 100..=100k
        assert_eq!(window.push_and_average(100), 100.0);
        assert_eq!(window.push_and_average(200), 150.0);
        assert_eq!(window.push_and_average(300), 200.0);
        assert_eq!(window.fill(), 3);
        assert!(!window.warmed_up());
    }

    #[test]
    fn full_window_divides_by_capacity_indefinitely() {
        let mut window = SampleWindow::new();
        for _ in 0..SAMPLE_WINDOW {
            window.push_and_average(10);
        }
        assert!(window.warmed_up());
        // Overwrites one slot of 10 with 120: (9 * 10 + 120) / 10
        assert_eq!(window.push_and_average(120), 21.0);
        assert_eq!(window.fill(), SAMPLE_WINDOW);
        assert!(window.warmed_up());
    }

    #[test]
    fn oldest_sample_is_replaced_after_wrap() {
        let mut window = SampleWindow::new();
        let mut last = 0.0;
        for v in 1..=15u16 {
            last = window.push_and_average(v);
        }
        // Window now holds 6..=15
        assert_eq!(last, 10.5);
    }
}
