//! Float-to-PCM sample conversion
//!
//! The transcription and recording paths both speak 16-bit signed
//! little-endian PCM. Conversion clamps to [-1.0, 1.0] and scales
//! asymmetrically (negative samples by 32768, non-negative by 32767) so that
//! both rails map onto the full i16 range. Non-finite input samples map to
//! silence rather than failing the frame.

use bytes::{BufMut, Bytes, BytesMut};

/// Bytes per 16-bit PCM sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Convert one float sample to a 16-bit PCM sample.
pub fn f32_to_i16(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    let clamped = sample.clamp(-1.0, 1.0);
    let scaled = if clamped < 0.0 {
        clamped * 32768.0
    } else {
        clamped * 32767.0
    };
    scaled.round() as i16
}

/// Convert one 16-bit PCM sample back to float.
pub fn i16_to_f32(sample: i16) -> f32 {
    if sample < 0 {
        f32::from(sample) / 32768.0
    } else {
        f32::from(sample) / 32767.0
    }
}

/// Encode float samples as little-endian 16-bit PCM.
pub fn encode_frame(samples: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &sample in samples {
        buf.put_i16_le(f32_to_i16(sample));
    }
    buf.freeze()
}

/// A zeroed PCM frame of `sample_count` samples.
pub fn silence_frame(sample_count: usize) -> Bytes {
    Bytes::from(vec![0u8; sample_count * BYTES_PER_SAMPLE])
}
