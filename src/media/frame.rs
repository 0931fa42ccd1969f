//! Timestamped, shared media frames

use crate::audio::AudioFormat;
use crate::sync::{TrackDuration, TrackPosition};
use std::fmt;
use std::sync::Arc;

/// Kind of track a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Audio,
    Video,
    Subtitle,
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackType::Audio => write!(f, "audio"),
            TrackType::Video => write!(f, "video"),
            TrackType::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// Accumulated duration of all completed loops plus the loop index
///
/// Adding `pos` to a frame's local time turns a looping timeline into a
/// monotonic one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopOffset {
    pub pos: TrackDuration,
    pub index: i32,
}

impl LoopOffset {
    pub const fn new(pos: TrackDuration, index: i32) -> Self {
        Self { pos, index }
    }
}

/// Pixel layout of a video payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
    Gray8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Decoded PCM data
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub format: AudioFormat,
    pub data: Vec<u8>,
}

impl AudioPayload {
    pub fn frame_count(&self) -> usize {
        self.format.bytes_to_frames(self.data.len())
    }
}

/// Decoded picture
#[derive(Debug, Clone, PartialEq)]
pub struct VideoPayload {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub data: Vec<u8>,
}

impl VideoPayload {
    pub fn stride(&self) -> usize {
        self.width as usize * self.pixel_format.bytes_per_pixel()
    }
}

/// What a frame carries
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Audio(AudioPayload),
    Video(VideoPayload),
    Text(String),
}

#[derive(Debug)]
struct FrameData {
    loop_offset: LoopOffset,
    payload: FramePayload,
    pts: TrackPosition,
    duration: TrackDuration,
    source_id: u64,
}

/// Immutable, reference-counted media frame
///
/// Cloning is cheap and shares the payload; the data is freed when the last
/// clone is dropped.
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameData>,
}

impl Frame {
    /// Audio frame; its duration is derived from the sample count
    pub fn audio(
        loop_offset: LoopOffset,
        format: AudioFormat,
        data: Vec<u8>,
        pts: TrackPosition,
        source_id: u64,
    ) -> Self {
        let payload = AudioPayload { format, data };
        let duration = format.frames_to_duration(payload.frame_count());
        Self::new(loop_offset, FramePayload::Audio(payload), pts, duration, source_id)
    }

    pub fn video(
        loop_offset: LoopOffset,
        payload: VideoPayload,
        pts: TrackPosition,
        duration: TrackDuration,
        source_id: u64,
    ) -> Self {
        Self::new(loop_offset, FramePayload::Video(payload), pts, duration, source_id)
    }

    /// Subtitle cue
    pub fn text(
        loop_offset: LoopOffset,
        text: impl Into<String>,
        pts: TrackPosition,
        duration: TrackDuration,
        source_id: u64,
    ) -> Self {
        Self::new(loop_offset, FramePayload::Text(text.into()), pts, duration, source_id)
    }

    pub fn new(
        loop_offset: LoopOffset,
        payload: FramePayload,
        pts: TrackPosition,
        duration: TrackDuration,
        source_id: u64,
    ) -> Self {
        Self {
            inner: Arc::new(FrameData {
                loop_offset,
                payload,
                pts,
                duration,
                source_id,
            }),
        }
    }

    /// Start within the current loop
    pub fn pts(&self) -> TrackPosition {
        self.inner.pts
    }

    pub fn duration(&self) -> TrackDuration {
        self.inner.duration
    }

    pub fn end(&self) -> TrackPosition {
        self.inner.pts + self.inner.duration
    }

    /// Start on the monotonic, loop-adjusted timeline
    pub fn absolute_pts(&self) -> TrackPosition {
        self.pts() + self.inner.loop_offset.pos
    }

    pub fn absolute_end(&self) -> TrackPosition {
        self.end() + self.inner.loop_offset.pos
    }

    pub fn loop_offset(&self) -> LoopOffset {
        self.inner.loop_offset
    }

    /// Generation of the source that produced this frame
    pub fn source_id(&self) -> u64 {
        self.inner.source_id
    }

    pub fn payload(&self) -> &FramePayload {
        &self.inner.payload
    }

    pub fn track_type(&self) -> TrackType {
        match self.inner.payload {
            FramePayload::Audio(_) => TrackType::Audio,
            FramePayload::Video(_) => TrackType::Video,
            FramePayload::Text(_) => TrackType::Subtitle,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioPayload> {
        match &self.inner.payload {
            FramePayload::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoPayload> {
        match &self.inner.payload {
            FramePayload::Video(video) => Some(video),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.inner.payload {
            FramePayload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Whether both handles share the same frame data
    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("type", &self.track_type())
            .field("pts", &self.pts())
            .field("duration", &self.duration())
            .field("loop_offset", &self.loop_offset())
            .field("source_id", &self.source_id())
            .finish()
    }
}
