//! FFT-based magnitude spectrum for real-time visualization

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::pcm::{self, PcmLayout};
use super::signals::SweepGenerator;

/// Number of magnitude bins handed to the renderer
pub const NUM_BINS: usize = 256;

/// FFT size (must be power of 2)
pub const WINDOW_SIZE: usize = 1024;

/// Overlapping windows averaged per file frame
const SUB_WINDOWS: usize = 3;
const HOP: usize = WINDOW_SIZE / 2;

/// Frames read from a track file per analysis frame
pub const BLOCK_FRAMES: usize = WINDOW_SIZE + HOP * (SUB_WINDOWS - 1);

pub type Spectrum = [f32; NUM_BINS];

/// FFT plan plus scratch space, reused every tick
pub struct SpectrumCore {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    /// Pre-allocated scratch buffer for windowed samples (avoids allocation in hot path)
    windowed_buffer: Vec<f32>,
    spectrum_buffer: Vec<Complex<f32>>,
    sweep: SweepGenerator,
    sweep_block: Vec<f32>,
    /// `k` in `log10(mag * k + 1)`
    log_gain: f32,
}

impl SpectrumCore {
    pub fn new(sample_rate: u32, log_gain: f32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(WINDOW_SIZE);
        let spectrum_buffer = fft.make_output_vec();

        // Hamming window
        let window: Vec<f32> = (0..WINDOW_SIZE)
            .map(|i| {
                let x = i as f32 / (WINDOW_SIZE - 1) as f32;
                0.54 - 0.46 * (2.0 * std::f32::consts::PI * x).cos()
            })
            .collect();

        Self {
            fft,
            window,
            windowed_buffer: vec![0.0; WINDOW_SIZE],
            spectrum_buffer,
            sweep: SweepGenerator::new(sample_rate),
            sweep_block: vec![0.0; WINDOW_SIZE],
            log_gain,
        }
    }

    /// Magnitudes of the first `NUM_BINS` bins of one window, normalized to 0.0 - 1.0
    ///
    /// `samples` shorter than the window are zero-padded.
    pub fn magnitudes(&mut self, samples: &[f32]) -> Spectrum {
        for (i, w) in self.window.iter().enumerate() {
            self.windowed_buffer[i] = samples.get(i).copied().unwrap_or(0.0) * w;
        }

        let mut out = [0.0f32; NUM_BINS];
        if self
            .fft
            .process(&mut self.windowed_buffer, &mut self.spectrum_buffer)
            .is_err()
        {
            return out;
        }

        let scale = WINDOW_SIZE as f32 / 4.0;
        for (bin, value) in out.iter_mut().zip(&self.spectrum_buffer) {
            *bin = (value.norm() / scale).min(1.0);
        }
        out
    }

    /// Spectrum of the test sweep `t` seconds in
    pub fn synthetic_frame(&mut self, t: f32) -> Spectrum {
        let mut block = std::mem::take(&mut self.sweep_block);
        self.sweep.fill_block(t, &mut block);
        let out = self.magnitudes(&block);
        self.sweep_block = block;
        out
    }

    /// Spectrum of the audio `elapsed` into a track file, log-compressed
    ///
    /// Any read problem gives silence rather than an error.
    pub fn file_frame(&mut self, path: &Path, layout: &PcmLayout, elapsed: Duration) -> Spectrum {
        let Some(block) = pcm::read_mono_block(path, layout, elapsed, BLOCK_FRAMES) else {
            return [0.0; NUM_BINS];
        };

        let mut sum = [0.0f32; NUM_BINS];
        for start in (0..SUB_WINDOWS).map(|w| w * HOP) {
            let mags = self.magnitudes(&block[start..start + WINDOW_SIZE]);
            for (acc, m) in sum.iter_mut().zip(mags) {
                *acc += m;
            }
        }

        for bin in sum.iter_mut() {
            *bin = self.compress(*bin / SUB_WINDOWS as f32);
        }
        sum
    }

    /// Perceptual loudness approximation, maps 0.0 - 1.0 onto itself for the default gain
    pub fn compress(&self, magnitude: f32) -> f32 {
        let scaled = (magnitude * self.log_gain + 1.0).log10();
        let full_scale = (self.log_gain + 1.0).log10();
        if full_scale > 0.0 {
            scaled / full_scale
        } else {
            0.0
        }
    }
}

/// Fade toward silence by `factor` (< 1)
pub fn decay(buffer: &mut Spectrum, factor: f32) {
    for bin in buffer.iter_mut() {
        *bin *= factor;
    }
}

/// Exponential moving average: `buffer = new * weight + buffer * (1 - weight)`
pub fn blend(buffer: &mut Spectrum, new: &Spectrum, new_weight: f32) {
    for (old, n) in buffer.iter_mut().zip(new) {
        *old = n * new_weight + *old * (1.0 - new_weight);
    }
}
