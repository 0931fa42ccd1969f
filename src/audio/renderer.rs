//! Audio presentation into a ring buffer feeding the output device

use crate::audio::volume::{apply_volume, VolumeLevel};
use crate::audio::{AudioFormat, Producer};
use crate::error::{AvSyncError, Result};
use crate::media::{Frame, TrackType};
use crate::render::{FrameRenderer, RenderContext, RenderingResult};
use crate::sync::{PlaybackRate, RealDuration};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

const MIN_RECHECK: RealDuration = RealDuration::from_millis(1);
const MAX_RECHECK: RealDuration = RealDuration::from_millis(20);

/// Writes volume-scaled PCM frames into the output ring buffer
///
/// A frame that does not fit is written partially; the rest follows on the
/// next attempt once the device has drained some data.
pub struct AudioRenderer {
    format: AudioFormat,
    output: Option<Producer<u8>>,
    volume: Arc<VolumeLevel>,
    /// Bytes of the front frame already written
    written: usize,
    scratch: Vec<u8>,
}

impl AudioRenderer {
    pub fn new(format: AudioFormat, output: Producer<u8>, volume: Arc<VolumeLevel>) -> Self {
        info!("Audio renderer format: {}", format);
        Self {
            format,
            output: Some(output),
            volume,
            written: 0,
            scratch: Vec::new(),
        }
    }

    /// Renderer without an output; frames fail until one is set
    pub fn detached(format: AudioFormat, volume: Arc<VolumeLevel>) -> Self {
        Self {
            format,
            output: None,
            volume,
            written: 0,
            scratch: Vec::new(),
        }
    }

    /// Switch to a new output buffer (and possibly a new format)
    ///
    /// Any partially written frame restarts from its beginning.
    pub fn set_output(&mut self, format: AudioFormat, output: Producer<u8>) {
        info!("Audio output changed: {} -> {}", self.format, format);
        self.format = format;
        self.output = Some(output);
        self.written = 0;
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn volume(&self) -> &Arc<VolumeLevel> {
        &self.volume
    }

    /// Time for the device to play `bytes`, bounded to a sane polling range
    fn recheck_interval(&self, bytes: usize) -> RealDuration {
        self.format
            .bytes_to_real_duration(bytes)
            .clamp(MIN_RECHECK, MAX_RECHECK)
    }
}

impl FrameRenderer for AudioRenderer {
    fn track_type(&self) -> TrackType {
        TrackType::Audio
    }

    fn render_frame(
        &mut self,
        frame: Option<&Frame>,
        _ctx: &RenderContext<'_>,
    ) -> Result<RenderingResult> {
        let Some(frame) = frame else {
            debug!("Audio end of track");
            return Ok(RenderingResult::DONE);
        };

        let Some(audio) = frame.as_audio() else {
            return Err(AvSyncError::FormatMismatch {
                expected: self.format.to_string(),
                actual: frame.track_type().to_string(),
            });
        };

        if audio.format != self.format {
            return Err(AvSyncError::FormatMismatch {
                expected: self.format.to_string(),
                actual: audio.format.to_string(),
            });
        }

        let Some(output) = self.output.as_mut() else {
            return Err(AvSyncError::device_error("audio", "no output configured"));
        };

        if output.is_abandoned() {
            return Err(AvSyncError::device_error("audio", "output disconnected"));
        }

        let remaining = &audio.data[self.written..];
        let block_align = self.format.block_align().max(1);
        let free = output.free();
        let len = remaining.len().min(free - free % block_align);

        if len > 0 {
            self.scratch.clear();
            self.scratch.resize(len, self.format.sample_format.silence_byte());
            apply_volume(
                self.volume.get(),
                self.format.sample_format,
                &remaining[..len],
                &mut self.scratch,
            );
            self.written += output.write(&self.scratch);
        }

        let left = audio.data.len() - self.written;
        if left == 0 {
            trace!("Audio frame at {} written", frame.absolute_pts());
            self.written = 0;
            return Ok(RenderingResult::DONE);
        }

        trace!("Audio output full, {} bytes pending", left);
        Ok(RenderingResult::retry_after(self.recheck_interval(left)))
    }

    fn on_playback_rate_changed(&mut self, rate: PlaybackRate) {
        if rate != 1.0 {
            warn!(
                "Audio playback rate {} is not resampled; output is paced by the time mapping only",
                rate
            );
        }
    }

    fn on_pause_changed(&mut self, paused: bool) {
        debug!("Audio renderer paused={}", paused);
    }

    fn flush(&mut self) {
        self.written = 0;
    }
}
