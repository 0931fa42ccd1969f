//! Synthetic media generator standing in for a decoder

use crate::audio::{AudioFormat, SampleFormat};
use crate::media::{Frame, LoopOffset, PixelFormat, VideoPayload};
use crate::sync::{TrackDuration, TrackPosition};
use std::f64::consts::TAU;

/// Length of one generated audio frame
const AUDIO_CHUNK: TrackDuration = TrackDuration::from_millis(20);

/// Length of one subtitle cue; cues start every second
const CUE_LENGTH: TrackDuration = TrackDuration::from_millis(800);

/// Produces a sine tone, a moving test pattern, and one cue per second
///
/// Every loop repeats the same media with an increased [`LoopOffset`], and
/// every generated batch carries a fresh source id.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    audio_format: AudioFormat,
    tone_hz: f64,
    frame_rate: u32,
    width: u32,
    height: u32,
    duration: TrackDuration,
    loops: u32,
    next_source_id: u64,
}

impl SyntheticSource {
    pub fn new(audio_format: AudioFormat, duration: TrackDuration, loops: u32) -> Self {
        Self {
            audio_format,
            tone_hz: 440.0,
            frame_rate: 25,
            width: 64,
            height: 36,
            duration,
            loops: loops.max(1),
            next_source_id: 0,
        }
    }

    pub fn with_tone(mut self, tone_hz: f64) -> Self {
        self.tone_hz = tone_hz;
        self
    }

    pub fn with_video(mut self, width: u32, height: u32, frame_rate: u32) -> Self {
        self.width = width;
        self.height = height;
        self.frame_rate = frame_rate.max(1);
        self
    }

    pub fn audio_format(&self) -> AudioFormat {
        self.audio_format
    }

    /// Length of one loop
    pub fn duration(&self) -> TrackDuration {
        self.duration
    }

    pub fn loops(&self) -> u32 {
        self.loops
    }

    /// Offset applied to frames of loop `index`
    pub fn loop_offset(&self, index: u32) -> LoopOffset {
        LoopOffset::new(
            TrackDuration::new(self.duration.get() * index as i64),
            index as i32,
        )
    }

    /// Audio frames of all loops in presentation order
    pub fn audio_frames(&mut self) -> Vec<Frame> {
        let source_id = self.take_source_id();
        let format = self.audio_format;
        let mut frames = Vec::new();

        for index in 0..self.loops {
            let offset = self.loop_offset(index);
            let mut pts = TrackPosition::ZERO;
            while pts < TrackPosition::ZERO + self.duration {
                let length = AUDIO_CHUNK.min(TrackPosition::ZERO + self.duration - pts);
                let first_frame = micros_to_frames(pts.get(), format.sample_rate);
                let frame_count = micros_to_frames(length.get(), format.sample_rate);
                let data = self.tone(first_frame, frame_count);
                frames.push(Frame::audio(offset, format, data, pts, source_id));
                pts += length;
            }
        }

        frames
    }

    /// Test pattern frames of all loops in presentation order
    pub fn video_frames(&mut self) -> Vec<Frame> {
        let source_id = self.take_source_id();
        let frame_duration = TrackDuration::new(1_000_000 / self.frame_rate as i64);
        let mut frames = Vec::new();

        for index in 0..self.loops {
            let offset = self.loop_offset(index);
            let mut number = 0u32;
            let mut pts = TrackPosition::ZERO;
            while pts < TrackPosition::ZERO + self.duration {
                frames.push(Frame::video(
                    offset,
                    self.pattern(number),
                    pts,
                    frame_duration,
                    source_id,
                ));
                number += 1;
                pts += frame_duration;
            }
        }

        frames
    }

    /// Subtitle cues of all loops, each followed by an empty cue that clears it
    pub fn subtitle_frames(&mut self) -> Vec<Frame> {
        let source_id = self.take_source_id();
        let second = TrackDuration::from_secs(1);
        let mut frames = Vec::new();

        for index in 0..self.loops {
            let offset = self.loop_offset(index);
            let mut number = 1;
            let mut pts = TrackPosition::ZERO;
            while pts < TrackPosition::ZERO + self.duration {
                let length = CUE_LENGTH.min(TrackPosition::ZERO + self.duration - pts);
                let text = format!("loop {} cue {}", index + 1, number);
                frames.push(Frame::text(offset, text, pts, length, source_id));
                frames.push(Frame::text(
                    offset,
                    "",
                    pts + length,
                    TrackDuration::ZERO,
                    source_id,
                ));
                number += 1;
                pts += second;
            }
        }

        frames
    }

    fn take_source_id(&mut self) -> u64 {
        let id = self.next_source_id;
        self.next_source_id += 1;
        id
    }

    /// Interleaved sine samples starting at sample frame `first`
    fn tone(&self, first: usize, count: usize) -> Vec<u8> {
        let format = self.audio_format;
        let channels = format.channels as usize;
        let mut data = Vec::with_capacity(format.frames_to_bytes(count));

        for i in 0..count {
            let t = (first + i) as f64 / format.sample_rate as f64;
            // keep below full scale so the gain clamp is observable
            let value = 0.5 * (TAU * self.tone_hz * t).sin();

            for _ in 0..channels {
                match format.sample_format {
                    SampleFormat::UInt8 => data.push((value * 127.0 + 128.0).round() as u8),
                    SampleFormat::Int16 => data.extend_from_slice(
                        &((value * i16::MAX as f64).round() as i16).to_ne_bytes(),
                    ),
                    SampleFormat::Int32 => data.extend_from_slice(
                        &((value * i32::MAX as f64).round() as i32).to_ne_bytes(),
                    ),
                    SampleFormat::Float => data.extend_from_slice(&(value as f32).to_ne_bytes()),
                }
            }
        }

        data
    }

    /// Gray8 picture with a bar that moves one column per frame
    fn pattern(&self, number: u32) -> VideoPayload {
        let bar = number % self.width.max(1);
        let mut data = Vec::with_capacity((self.width * self.height) as usize);

        for _ in 0..self.height {
            for x in 0..self.width {
                data.push(if x == bar { 0xff } else { 0x20 });
            }
        }

        VideoPayload {
            width: self.width,
            height: self.height,
            pixel_format: PixelFormat::Gray8,
            data,
        }
    }
}

fn micros_to_frames(micros: i64, sample_rate: u32) -> usize {
    (micros as i128 * sample_rate as i128 / 1_000_000) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(sample_format: SampleFormat) -> SyntheticSource {
        SyntheticSource::new(
            AudioFormat::new(48_000, 2, sample_format),
            TrackDuration::from_millis(100),
            2,
        )
    }

    #[test]
    fn test_audio_covers_every_loop_contiguously() {
        let mut source = source(SampleFormat::Int16);
        let frames = source.audio_frames();

        assert_eq!(frames.len(), 10);
        for pair in frames.windows(2) {
            assert_eq!(pair[0].absolute_end(), pair[1].absolute_pts());
        }
        assert_eq!(
            frames.last().map(|f| f.absolute_end()),
            Some(TrackPosition::new(200_000))
        );
        assert_eq!(frames[5].loop_offset(), source.loop_offset(1));
        assert_eq!(frames[5].pts(), TrackPosition::ZERO);
    }

    #[test]
    fn test_tone_in_every_sample_format() {
        for format in [
            SampleFormat::UInt8,
            SampleFormat::Int16,
            SampleFormat::Int32,
            SampleFormat::Float,
        ] {
            let mut source = source(format);
            let frames = source.audio_frames();
            let audio = frames[0].as_audio().unwrap();
            assert_eq!(audio.frame_count(), 960, "{}", format);
            assert_eq!(frames[0].duration(), TrackDuration::from_millis(20));
        }
    }

    #[test]
    fn test_video_pattern_and_timing() {
        let mut source = source(SampleFormat::Float).with_video(8, 2, 50);
        let frames = source.video_frames();

        assert_eq!(frames.len(), 10);
        assert_eq!(frames[1].pts(), TrackPosition::new(20_000));
        let picture = frames[1].as_video().unwrap();
        assert_eq!(picture.data.len(), 16);
        assert_eq!(picture.data[1], 0xff);
        assert_eq!(picture.data[0], 0x20);
    }

    #[test]
    fn test_cues_are_cleared_and_source_ids_increase() {
        let mut source = SyntheticSource::new(
            AudioFormat::new(8_000, 1, SampleFormat::UInt8),
            TrackDuration::from_millis(2_500),
            1,
        );
        let audio_id = source.audio_frames()[0].source_id();
        let cues = source.subtitle_frames();

        assert_eq!(cues.len(), 6);
        assert_eq!(cues[0].as_text(), Some("loop 1 cue 1"));
        assert_eq!(cues[1].as_text(), Some(""));
        assert_eq!(cues[1].pts(), TrackPosition::new(800_000));
        // last cue is cut at the end of the media
        assert_eq!(cues[5].pts(), TrackPosition::new(2_500_000));
        assert!(cues[0].source_id() > audio_id);
    }
}
