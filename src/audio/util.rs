//! Shared audio utilities for synthesizer output.

use std::io::Cursor;

use bytes::{BufMut, Bytes, BytesMut};
use hound::{SampleFormat, WavReader};

use super::AudioFormat;

/// Extract 16-bit PCM audio from a WAV container.
///
/// # Arguments
/// * `wav` - Complete WAV file contents
///
/// # Returns
/// The stream's sample format and its interleaved little-endian PCM bytes.
///
/// # Errors
/// Returns an error if the container is malformed or the samples are not
/// 16-bit integers.
pub fn pcm_from_wav(wav: &[u8]) -> Result<(AudioFormat, Bytes), hound::Error> {
    let reader = WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(hound::Error::Unsupported);
    }

    let format = AudioFormat::new(spec.sample_rate, 2, spec.channels);
    let mut pcm = BytesMut::with_capacity(reader.len() as usize * 2);
    for sample in reader.into_samples::<i16>() {
        pcm.put_i16_le(sample?);
    }

    Ok((format, pcm.freeze()))
}
