//! Terminal rendering of the spectrum

use crate::audio::Spectrum;

/// Columns in the bar line
pub const NUM_BANDS: usize = 32;

const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Collapse the bins into `count` bands, keeping each group's peak
pub fn group_bands(spectrum: &Spectrum, count: usize) -> Vec<f32> {
    if count == 0 {
        return Vec::new();
    }
    let per_band = (spectrum.len() / count).max(1);
    spectrum
        .chunks(per_band)
        .take(count)
        .map(|group| group.iter().cloned().fold(0.0f32, f32::max))
        .collect()
}

/// One character per band, eighth-block resolution
pub fn bar_line(bands: &[f32]) -> String {
    let top = (LEVELS.len() - 1) as f32;
    bands
        .iter()
        .map(|m| LEVELS[(m.clamp(0.0, 1.0) * top).round() as usize])
        .collect()
}
