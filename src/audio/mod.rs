//! Spectrum analysis for the visualizer
//!
//! - Synthetic sweep for testing without a disc
//! - Raw PCM sampling from track files at the current playback position
//! - FFT magnitudes smoothed over time on a background thread

pub mod analyzer;
pub mod pcm;
pub mod signals;
pub mod spectrum;

pub use analyzer::{SpectrumAnalyzer, SpectrumTicker, TickKind};
pub use spectrum::{Spectrum, NUM_BINS};
