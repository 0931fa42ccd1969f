//! Video presentation

use crate::error::{AvSyncError, Result};
use crate::media::{Frame, TrackType, VideoPayload};
use crate::render::{FrameRenderer, RenderContext, RenderingResult};
use crate::sync::{PlaybackRate, RealDuration};
use tracing::{debug, info, trace};

/// Display surface receiving decoded pictures
pub trait VideoSink: Send + 'static {
    fn present(&mut self, frame: &Frame, picture: &VideoPayload) -> Result<()>;
}

/// Sink that only logs what would be shown
#[derive(Debug, Default)]
pub struct LogVideoSink {
    presented: u64,
}

impl LogVideoSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoSink for LogVideoSink {
    fn present(&mut self, frame: &Frame, picture: &VideoPayload) -> Result<()> {
        self.presented += 1;
        debug!(
            "Video frame #{} {}x{} at {}",
            self.presented,
            picture.width,
            picture.height,
            frame.absolute_pts()
        );
        Ok(())
    }
}

/// Hands due frames to a [`VideoSink`], dropping frames that are too late
///
/// A frame later than its own duration is skipped unless it was requested
/// by a force step, which always shows a picture.
pub struct VideoRenderer {
    sink: Option<Box<dyn VideoSink>>,
    presented: u64,
    dropped: u64,
}

impl VideoRenderer {
    pub fn new(sink: impl VideoSink) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            presented: 0,
            dropped: 0,
        }
    }

    /// Swap the display surface
    pub fn set_sink(&mut self, sink: impl VideoSink) {
        info!("Video sink changed");
        self.sink = Some(Box::new(sink));
    }

    /// Detach the display surface; frames fail until a new one is set
    pub fn clear_sink(&mut self) {
        self.sink = None;
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl FrameRenderer for VideoRenderer {
    fn track_type(&self) -> TrackType {
        TrackType::Video
    }

    fn render_frame(
        &mut self,
        frame: Option<&Frame>,
        ctx: &RenderContext<'_>,
    ) -> Result<RenderingResult> {
        let Some(frame) = frame else {
            // the last picture stays on screen
            debug!(
                "Video end of track: {} presented, {} dropped",
                self.presented, self.dropped
            );
            return Ok(RenderingResult::DONE);
        };

        let Some(picture) = frame.as_video() else {
            return Err(AvSyncError::FormatMismatch {
                expected: TrackType::Video.to_string(),
                actual: frame.track_type().to_string(),
            });
        };

        let rate = ctx.controller.playback_rate() as f64;
        let max_delay = RealDuration::new((frame.duration().get() as f64 / rate).round() as i64);
        let delay = ctx.frame_delay(frame);

        if !ctx.step_forced && delay > max_delay {
            self.dropped += 1;
            debug!(
                "Dropping late video frame at {} ({} late)",
                frame.absolute_pts(),
                delay
            );
            return Ok(RenderingResult::DONE);
        }

        let Some(sink) = self.sink.as_mut() else {
            return Err(AvSyncError::device_error("video", "no sink configured"));
        };

        sink.present(frame, picture)?;
        self.presented += 1;
        trace!("Video frame at {} presented", frame.absolute_pts());

        Ok(RenderingResult::DONE)
    }

    fn on_playback_rate_changed(&mut self, rate: PlaybackRate) {
        debug!("Video playback rate {}", rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{LoopOffset, PixelFormat};
    use crate::sync::{ManualClock, RealTimePoint, TimeController, TrackDuration, TrackPosition};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<TrackPosition>>>);

    impl VideoSink for Collect {
        fn present(&mut self, frame: &Frame, _picture: &VideoPayload) -> Result<()> {
            self.0.lock().push(frame.absolute_pts());
            Ok(())
        }
    }

    fn picture_at(ms: i64) -> Frame {
        Frame::video(
            LoopOffset::default(),
            VideoPayload {
                width: 1,
                height: 1,
                pixel_format: PixelFormat::Gray8,
                data: vec![0],
            },
            TrackPosition::new(ms * 1000),
            TrackDuration::from_millis(40),
            0,
        )
    }

    fn render_at(
        renderer: &mut VideoRenderer,
        frame: &Frame,
        now_ms: i64,
        step_forced: bool,
    ) -> Result<RenderingResult> {
        let clock = ManualClock::new(RealTimePoint::ZERO);
        let mut controller = TimeController::new(clock.shared());
        controller.sync(TrackPosition::ZERO);
        let ctx = RenderContext {
            controller: &controller,
            now: RealTimePoint::new(now_ms * 1000),
            step_forced,
        };
        renderer.render_frame(Some(frame), &ctx)
    }

    #[test]
    fn test_on_time_frame_is_presented() {
        let sink = Collect::default();
        let mut renderer = VideoRenderer::new(sink.clone());

        assert!(render_at(&mut renderer, &picture_at(100), 110, false).unwrap().done);
        assert_eq!(*sink.0.lock(), vec![TrackPosition::new(100_000)]);
        assert_eq!(renderer.presented(), 1);
    }

    #[test]
    fn test_late_frame_is_dropped_unless_forced() {
        let sink = Collect::default();
        let mut renderer = VideoRenderer::new(sink.clone());

        assert!(render_at(&mut renderer, &picture_at(100), 200, false).unwrap().done);
        assert!(sink.0.lock().is_empty());
        assert_eq!(renderer.dropped(), 1);

        assert!(render_at(&mut renderer, &picture_at(100), 200, true).unwrap().done);
        assert_eq!(sink.0.lock().len(), 1);
    }

    #[test]
    fn test_missing_sink_is_a_device_error() {
        let mut renderer = VideoRenderer::new(Collect::default());
        renderer.clear_sink();

        let err = render_at(&mut renderer, &picture_at(0), 0, false).unwrap_err();
        assert!(matches!(err, AvSyncError::Device { .. }));

        renderer.set_sink(Collect::default());
        assert!(render_at(&mut renderer, &picture_at(0), 0, false).is_ok());
    }
}
