//! Audio formats, transport, volume, and rendering

mod buffer;
mod output;
mod renderer;
mod volume;

pub use buffer::{Consumer, Producer, RingBuffer};
pub use output::{AudioOutput, AudioSink};
pub use renderer::AudioRenderer;
pub use volume::{apply_volume, apply_volume_in_place, VolumeLevel};

use crate::sync::{RealDuration, TrackDuration};

/// PCM sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit, silence at 0x80
    UInt8,
    Int16,
    Int32,
    Float,
}

impl SampleFormat {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::UInt8 => 1,
            SampleFormat::Int16 => 2,
            SampleFormat::Int32 | SampleFormat::Float => 4,
        }
    }

    /// Byte value that encodes silence in every byte of a sample
    pub const fn silence_byte(self) -> u8 {
        match self {
            SampleFormat::UInt8 => 0x80,
            _ => 0,
        }
    }

    pub const fn is_integer(self) -> bool {
        !matches!(self, SampleFormat::Float)
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SampleFormat::UInt8 => "u8",
            SampleFormat::Int16 => "s16",
            SampleFormat::Int32 => "s32",
            SampleFormat::Float => "f32",
        };
        f.write_str(name)
    }
}

/// Audio format information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// Bytes in one frame (one sample for every channel)
    pub fn block_align(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    /// Calculate bytes per second
    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.block_align() as u64
    }

    /// Calculate buffer size in bytes for given milliseconds, rounded down to whole frames
    pub fn buffer_size_for_ms(&self, ms: u32) -> usize {
        let bytes = (self.bytes_per_second() * ms as u64 / 1000) as usize;
        bytes - bytes % self.block_align().max(1)
    }

    /// Calculate number of frames for given bytes
    pub fn bytes_to_frames(&self, bytes: usize) -> usize {
        bytes / self.block_align().max(1)
    }

    /// Calculate bytes for given number of frames
    pub fn frames_to_bytes(&self, frames: usize) -> usize {
        frames * self.block_align()
    }

    /// Track duration covered by `frames` frames
    pub fn frames_to_duration(&self, frames: usize) -> TrackDuration {
        if self.sample_rate == 0 {
            return TrackDuration::ZERO;
        }
        TrackDuration::new((frames as i128 * 1_000_000 / self.sample_rate as i128) as i64)
    }

    /// Real time needed to play `bytes` at nominal speed
    pub fn bytes_to_real_duration(&self, bytes: usize) -> RealDuration {
        RealDuration::new(self.frames_to_duration(self.bytes_to_frames(bytes)).get())
    }

    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz {}ch {}",
            self.sample_rate, self.channels, self.sample_format
        )
    }
}
