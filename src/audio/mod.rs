//! Audio helpers for synthesized speech.
//!
//! This module describes the PCM sample format produced by the synthesizer,
//! slices raw PCM into delivery frames, and extracts PCM from WAV containers.

mod framer;
pub mod util;

pub use framer::frame_audio;

/// PCM sample format of a synthesized audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub rate: u32,     // Samples per second
    pub width: u16,    // Bytes per sample
    pub channels: u16, // Interleaved channel count
}

impl AudioFormat {
    /// Create a new sample format.
    pub const fn new(rate: u32, width: u16, channels: u16) -> Self {
        Self { rate, width, channels }
    }

    /// Number of bytes holding one sample for every channel.
    pub fn sample_bytes(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Convert a byte count into the number of whole samples it holds.
    pub fn samples_in(&self, bytes: usize) -> usize {
        match self.sample_bytes() {
            0 => 0,
            n => bytes / n,
        }
    }

    /// Playback duration in milliseconds of the given number of samples.
    pub fn millis_for(&self, samples: usize) -> u64 {
        if self.rate == 0 {
            return 0;
        }
        samples as u64 * 1000 / self.rate as u64
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz, {}-bit, {} channel(s)", self.rate, self.width * 8, self.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_arithmetic() {
        let format = AudioFormat::new(22050, 2, 1);
        assert_eq!(format.sample_bytes(), 2);
        assert_eq!(format.samples_in(2048), 1024);
        assert_eq!(format.millis_for(22050), 1000);

        let stereo = AudioFormat::new(48000, 2, 2);
        assert_eq!(stereo.samples_in(17), 4);
        assert_eq!(stereo.millis_for(24), 0);
    }
}
