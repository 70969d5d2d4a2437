//! Slicing of raw PCM audio into fixed-size delivery frames.

use bytes::Bytes;

use super::AudioFormat;

/// One outbound slice of a segment's PCM audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub format: AudioFormat, // Sample format shared by every frame of a session
    pub data: Bytes,         // Raw little-endian PCM bytes
}

impl AudioFrame {
    /// Number of whole samples carried by this frame.
    pub fn samples(&self) -> usize {
        self.format.samples_in(self.data.len())
    }
}

/// Split raw PCM audio into frames of `samples_per_chunk` samples.
///
/// The last frame keeps whatever remains and is never padded. Empty audio
/// produces no frames. Slicing shares the underlying buffer, so concatenating
/// the frames gives back exactly `audio`.
///
/// # Arguments
/// * `audio` - Raw PCM bytes for one segment
/// * `samples_per_chunk` - Target samples per frame (values below 1 are treated as 1)
/// * `format` - Sample format of `audio`
///
/// # Returns
/// Frames in playback order.
pub fn frame_audio(mut audio: Bytes, samples_per_chunk: usize, format: AudioFormat) -> Vec<AudioFrame> {
    let chunk_bytes = samples_per_chunk.max(1) * format.sample_bytes().max(1);
    let mut frames = Vec::with_capacity(audio.len().div_ceil(chunk_bytes));

    while !audio.is_empty() {
        let take = chunk_bytes.min(audio.len());
        frames.push(AudioFrame { format, data: audio.split_to(take) });
    }

    frames
}
