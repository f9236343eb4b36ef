//! Test signal generation for the synthetic analysis mode

use std::f32::consts::PI;

/// Lowest sweep frequency in Hz
pub const SWEEP_MIN_HZ: f32 = 20.0;
/// Highest sweep frequency in Hz
pub const SWEEP_MAX_HZ: f32 = 20000.0;
/// Seconds for one full sweep before it repeats
pub const SWEEP_PERIOD_SECS: f32 = 10.0;

/// Logarithmic sine sweep, repeating every period
#[derive(Debug, Clone)]
pub struct SweepGenerator {
    sample_rate: u32,
    min_freq: f32,
    max_freq: f32,
    period: f32,
}

impl SweepGenerator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            min_freq: SWEEP_MIN_HZ,
            max_freq: SWEEP_MAX_HZ.min(sample_rate as f32 / 2.0),
            period: SWEEP_PERIOD_SECS,
        }
    }

    /// Instantaneous sweep frequency `t` seconds after the sweep began
    pub fn frequency_at(&self, t: f32) -> f32 {
        let position = t.rem_euclid(self.period) / self.period;
        self.min_freq * (self.max_freq / self.min_freq).powf(position)
    }

    /// Fill `out` with a unit sine at the sweep frequency for time `t`
    ///
    /// The frequency is held constant across the block; at analysis block
    /// lengths the sweep moves far less than one FFT bin.
    pub fn fill_block(&self, t: f32, out: &mut [f32]) {
        let phase_step = 2.0 * PI * self.frequency_at(t) / self.sample_rate as f32;
        for (n, sample) in out.iter_mut().enumerate() {
            *sample = (phase_step * n as f32).sin();
        }
    }
}
