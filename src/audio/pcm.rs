//! Raw 16-bit PCM block reads from track files
//!
//! Used to sample whatever the engine is playing without decoding: the byte
//! offset is derived from elapsed playback time.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

const BYTES_PER_SAMPLE: u64 = 2;
/// How far into a file to look for a container header
const HEADER_PROBE_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Where the samples live in a file and how they are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    pub sample_rate: u32,
    pub channels: u16,
    pub byte_order: ByteOrder,
    /// First byte of sample data
    pub data_offset: u64,
}

impl PcmLayout {
    /// Headerless interleaved stereo, little-endian
    pub fn raw(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 2,
            byte_order: ByteOrder::Little,
            data_offset: 0,
        }
    }

    /// Detect an AIFF or WAV container, otherwise assume raw PCM
    pub fn probe(path: &Path, sample_rate: u32) -> Self {
        let mut header = Vec::with_capacity(HEADER_PROBE_BYTES);
        let read = File::open(path)
            .and_then(|f| f.take(HEADER_PROBE_BYTES as u64).read_to_end(&mut header));
        if read.is_err() {
            return Self::raw(sample_rate);
        }
        Self::from_header(&header, sample_rate)
    }

    fn from_header(header: &[u8], sample_rate: u32) -> Self {
        let raw = Self::raw(sample_rate);
        if header.len() < 12 {
            return raw;
        }

        let form = &header[8..12];
        if &header[0..4] == b"FORM" && (form == b"AIFF" || form == b"AIFC") {
            // SSND: id, size, offset, block size, then samples
            if let Some(pos) = find_chunk(header, b"SSND", ByteOrder::Big) {
                let skip = header
                    .get(pos + 8..pos + 12)
                    .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64)
                    .unwrap_or(0);
                return Self {
                    byte_order: ByteOrder::Big,
                    data_offset: pos as u64 + 16 + skip,
                    ..raw
                };
            }
        } else if &header[0..4] == b"RIFF" && form == b"WAVE" {
            if let Some(pos) = find_chunk(header, b"data", ByteOrder::Little) {
                return Self {
                    data_offset: pos as u64 + 8,
                    ..raw
                };
            }
        }

        raw
    }

    pub fn frame_size(&self) -> u64 {
        self.channels as u64 * BYTES_PER_SAMPLE
    }

    /// Frame-aligned byte position `elapsed` into the audio
    pub fn byte_offset(&self, elapsed: Duration) -> u64 {
        let frames = (self.sample_rate as f64 * elapsed.as_secs_f64()) as u64;
        self.data_offset + frames * self.frame_size()
    }

    fn decode(&self, bytes: [u8; 2]) -> f32 {
        let sample = match self.byte_order {
            ByteOrder::Little => i16::from_le_bytes(bytes),
            ByteOrder::Big => i16::from_be_bytes(bytes),
        };
        sample as f32 / 32768.0
    }
}

/// Walk the chunk list after the 12-byte form header; chunks are padded to even sizes
fn find_chunk(header: &[u8], id: &[u8; 4], order: ByteOrder) -> Option<usize> {
    let mut pos = 12;
    while let Some(chunk) = header.get(pos..pos + 8) {
        if &chunk[0..4] == id {
            return Some(pos);
        }
        let size_bytes = [chunk[4], chunk[5], chunk[6], chunk[7]];
        let size = match order {
            ByteOrder::Little => u32::from_le_bytes(size_bytes),
            ByteOrder::Big => u32::from_be_bytes(size_bytes),
        } as usize;
        pos = pos.checked_add(8)?.checked_add(size)?.checked_add(size & 1)?;
    }
    None
}

/// Read `frames` frames at the position `elapsed` into the file, downmixed to mono
///
/// `None` when the file is missing, too short, or the position is past the end.
pub fn read_mono_block(
    path: &Path,
    layout: &PcmLayout,
    elapsed: Duration,
    frames: usize,
) -> Option<Vec<f32>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("PCM: cannot open {}: {}", path.display(), e);
            return None;
        }
    };

    let len = file.metadata().ok()?.len();
    let offset = layout.byte_offset(elapsed);
    let frame_size = layout.frame_size() as usize;
    let needed = (frames * frame_size) as u64;

    if offset.checked_add(needed)? > len {
        log::debug!(
            "PCM: {} bytes at {} past end of {} ({} bytes)",
            needed,
            offset,
            path.display(),
            len
        );
        return None;
    }

    let mut bytes = vec![0u8; needed as usize];
    if let Err(e) = file
        .seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_exact(&mut bytes))
    {
        log::debug!("PCM: read failed on {}: {}", path.display(), e);
        return None;
    }

    let channels = layout.channels.max(1) as usize;
    let block = bytes
        .chunks_exact(frame_size)
        .map(|frame| {
            let sum: f32 = frame
                .chunks_exact(BYTES_PER_SAMPLE as usize)
                .map(|s| layout.decode([s[0], s[1]]))
                .sum();
            sum / channels as f32
        })
        .collect();

    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_file(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cdp-pcm-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    fn stereo_le(frames: &[(i16, i16)]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|(l, r)| {
                let mut bytes = l.to_le_bytes().to_vec();
                bytes.extend_from_slice(&r.to_le_bytes());
                bytes
            })
            .collect()
    }

    #[test]
    fn test_byte_offset_is_frame_aligned() {
        let layout = PcmLayout::raw(44100);
        assert_eq!(layout.byte_offset(Duration::ZERO), 0);
        assert_eq!(layout.byte_offset(Duration::from_secs(1)), 44100 * 4);
        let odd = layout.byte_offset(Duration::from_micros(12_345));
        assert_eq!(odd % layout.frame_size(), 0);
    }

    #[test]
    fn test_downmix() {
        let path = scratch_file("track.pcm", &stereo_le(&[(16384, 0), (-16384, -16384), (32767, -32768)]));
        let block = read_mono_block(&path, &PcmLayout::raw(44100), Duration::ZERO, 3).unwrap();
        assert_eq!(block.len(), 3);
        assert!((block[0] - 0.25).abs() < 1e-6);
        assert!((block[1] + 0.5).abs() < 1e-6);
        assert!(block[2].abs() < 1e-3);
        cleanup(&path);
    }

    #[test]
    fn test_empty_file_yields_nothing() {
        let path = scratch_file("empty.pcm", &[]);
        assert!(read_mono_block(&path, &PcmLayout::raw(44100), Duration::ZERO, 16).is_none());
        cleanup(&path);
    }

    #[test]
    fn test_offset_past_end_yields_nothing() {
        let path = scratch_file("short.pcm", &stereo_le(&[(1, 1); 64]));
        let layout = PcmLayout::raw(44100);
        assert!(read_mono_block(&path, &layout, Duration::ZERO, 64).is_some());
        assert!(read_mono_block(&path, &layout, Duration::ZERO, 65).is_none());
        assert!(read_mono_block(&path, &layout, Duration::from_secs(1), 1).is_none());
        cleanup(&path);
    }

    #[test]
    fn test_missing_file_yields_nothing() {
        let path = PathBuf::from("/nonexistent/cdp/track.pcm");
        assert!(read_mono_block(&path, &PcmLayout::raw(44100), Duration::ZERO, 1).is_none());
    }

    #[test]
    fn test_probe_wav() {
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&0u32.to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&[0u8; 16]);
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&4u32.to_le_bytes());
        wav.extend_from_slice(&stereo_le(&[(8192, 8192)]));

        let path = scratch_file("track.wav", &wav);
        let layout = PcmLayout::probe(&path, 44100);
        assert_eq!(layout.byte_order, ByteOrder::Little);
        assert_eq!(layout.data_offset, 44);

        let block = read_mono_block(&path, &layout, Duration::ZERO, 1).unwrap();
        assert!((block[0] - 0.25).abs() < 1e-6);
        cleanup(&path);
    }

    #[test]
    fn test_probe_skips_chunks_mentioning_data() {
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&0u32.to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&[0u8; 16]);
        // Odd-sized LIST chunk whose text contains "data", plus its pad byte
        wav.extend_from_slice(b"LIST");
        wav.extend_from_slice(&11u32.to_le_bytes());
        wav.extend_from_slice(b"INFOdata ok");
        wav.push(0);
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&4u32.to_le_bytes());
        wav.extend_from_slice(&stereo_le(&[(8192, 8192)]));

        let path = scratch_file("tagged.wav", &wav);
        let layout = PcmLayout::probe(&path, 44100);
        assert_eq!(layout.data_offset, 64);

        let block = read_mono_block(&path, &layout, Duration::ZERO, 1).unwrap();
        assert!((block[0] - 0.25).abs() < 1e-6);
        cleanup(&path);
    }

    #[test]
    fn test_probe_aiff() {
        let mut aiff = Vec::new();
        aiff.extend_from_slice(b"FORM");
        aiff.extend_from_slice(&0u32.to_be_bytes());
        aiff.extend_from_slice(b"AIFF");
        aiff.extend_from_slice(b"COMM");
        aiff.extend_from_slice(&18u32.to_be_bytes());
        aiff.extend_from_slice(&[0u8; 18]);
        aiff.extend_from_slice(b"SSND");
        aiff.extend_from_slice(&12u32.to_be_bytes());
        aiff.extend_from_slice(&0u32.to_be_bytes());
        aiff.extend_from_slice(&0u32.to_be_bytes());
        aiff.extend_from_slice(&8192i16.to_be_bytes());
        aiff.extend_from_slice(&8192i16.to_be_bytes());

        let path = scratch_file("1 Audio Track.aiff", &aiff);
        let layout = PcmLayout::probe(&path, 44100);
        assert_eq!(layout.byte_order, ByteOrder::Big);
        assert_eq!(layout.data_offset, 54);

        let block = read_mono_block(&path, &layout, Duration::ZERO, 1).unwrap();
        assert!((block[0] - 0.25).abs() < 1e-6);
        cleanup(&path);
    }

    #[test]
    fn test_probe_raw() {
        let path = scratch_file("track.cdda", &stereo_le(&[(0, 0); 8]));
        assert_eq!(PcmLayout::probe(&path, 44100), PcmLayout::raw(44100));
        cleanup(&path);
    }
}
