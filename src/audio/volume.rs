//! Gain scaling of interleaved PCM sample buffers

use crate::audio::SampleFormat;
use std::sync::atomic::{AtomicU32, Ordering};

/// Atomic gain stored as u32 bits of an f32
///
/// Lets the control thread change the volume while a render thread reads it
/// without locking. Negative values are clamped to 0; values above 1 are kept
/// and only clamped per format when applied.
#[derive(Debug)]
pub struct VolumeLevel(AtomicU32);

impl VolumeLevel {
    /// Create with default volume of 1.0 (full)
    pub fn new() -> Self {
        Self::with_volume(1.0)
    }

    pub fn with_volume(volume: f32) -> Self {
        Self(AtomicU32::new(sanitize(volume).to_bits()))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, volume: f32) {
        self.0.store(sanitize(volume).to_bits(), Ordering::Relaxed);
    }
}

impl Default for VolumeLevel {
    fn default() -> Self {
        Self::new()
    }
}

fn sanitize(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.max(0.0)
    }
}

/// Scale every sample of `src` by `volume` and write the result to `dst`
///
/// * gain 1.0 copies unchanged
/// * gain 0.0 writes silence (0x80 bytes for `UInt8`, zero otherwise)
/// * integer formats clamp the gain to [0, 1]; float applies it as given
///
/// # Panics
/// If `src` and `dst` differ in length.
pub fn apply_volume(volume: f32, format: SampleFormat, src: &[u8], dst: &mut [u8]) {
    assert_eq!(
        src.len(),
        dst.len(),
        "volume source and destination must be the same size"
    );

    if volume == 1.0 {
        dst.copy_from_slice(src);
        return;
    }

    if volume == 0.0 {
        dst.fill(format.silence_byte());
        return;
    }

    dst.copy_from_slice(src);
    scale_samples(effective_gain(volume, format), format, dst);
}

/// In-place variant of [`apply_volume`]
#[inline]
pub fn apply_volume_in_place(volume: f32, format: SampleFormat, data: &mut [u8]) {
    if volume == 1.0 {
        return;
    }

    if volume == 0.0 {
        data.fill(format.silence_byte());
        return;
    }

    scale_samples(effective_gain(volume, format), format, data);
}

/// Integer formats clamp the gain to [0, 1]; float applies it as given
fn effective_gain(volume: f32, format: SampleFormat) -> f32 {
    if format.is_integer() {
        volume.clamp(0.0, 1.0)
    } else {
        volume
    }
}

fn scale_samples(factor: f32, format: SampleFormat, data: &mut [u8]) {
    match format {
        SampleFormat::UInt8 => {
            for sample in data.iter_mut() {
                let centered = *sample as i32 - 0x80;
                let scaled = (centered as f32 * factor) as i32;
                *sample = (scaled + 0x80).clamp(0, u8::MAX as i32) as u8;
            }
        }
        SampleFormat::Int16 => {
            for sample in data.chunks_exact_mut(2) {
                let value = i16::from_ne_bytes([sample[0], sample[1]]);
                let scaled = (value as f32 * factor) as i16;
                sample.copy_from_slice(&scaled.to_ne_bytes());
            }
        }
        SampleFormat::Int32 => {
            let factor = factor as f64;
            for sample in data.chunks_exact_mut(4) {
                let value = i32::from_ne_bytes([sample[0], sample[1], sample[2], sample[3]]);
                let scaled = (value as f64 * factor) as i32;
                sample.copy_from_slice(&scaled.to_ne_bytes());
            }
        }
        SampleFormat::Float => {
            for sample in data.chunks_exact_mut(4) {
                let value = f32::from_ne_bytes([sample[0], sample[1], sample[2], sample[3]]);
                sample.copy_from_slice(&(value * factor).to_ne_bytes());
            }
        }
    }
}
