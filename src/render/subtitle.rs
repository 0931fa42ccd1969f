//! Subtitle cue presentation

use crate::error::{AvSyncError, Result};
use crate::media::{Frame, TrackType};
use crate::render::{FrameRenderer, RenderContext, RenderingResult};
use tracing::{debug, info};

/// Receives the currently visible subtitle text
pub trait SubtitleSink: Send + 'static {
    fn show(&mut self, text: &str) -> Result<()>;

    fn clear(&mut self) -> Result<()>;
}

/// Sink that logs cues as they appear
#[derive(Debug, Default)]
pub struct LogSubtitleSink;

impl SubtitleSink for LogSubtitleSink {
    fn show(&mut self, text: &str) -> Result<()> {
        info!("Subtitle: {}", text);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        debug!("Subtitle cleared");
        Ok(())
    }
}

/// Shows each cue at its start time
///
/// An empty cue clears the text; so does the end of the track.
pub struct SubtitleRenderer {
    sink: Box<dyn SubtitleSink>,
    visible: bool,
}

impl SubtitleRenderer {
    pub fn new(sink: impl SubtitleSink) -> Self {
        Self {
            sink: Box::new(sink),
            visible: false,
        }
    }

    pub fn set_sink(&mut self, sink: impl SubtitleSink) {
        self.sink = Box::new(sink);
        self.visible = false;
    }

    fn clear(&mut self) -> Result<()> {
        if self.visible {
            self.sink.clear()?;
            self.visible = false;
        }
        Ok(())
    }
}

impl FrameRenderer for SubtitleRenderer {
    fn track_type(&self) -> TrackType {
        TrackType::Subtitle
    }

    fn render_frame(
        &mut self,
        frame: Option<&Frame>,
        _ctx: &RenderContext<'_>,
    ) -> Result<RenderingResult> {
        let Some(frame) = frame else {
            self.clear()?;
            return Ok(RenderingResult::DONE);
        };

        let Some(text) = frame.as_text() else {
            return Err(AvSyncError::FormatMismatch {
                expected: TrackType::Subtitle.to_string(),
                actual: frame.track_type().to_string(),
            });
        };

        if text.is_empty() {
            self.clear()?;
        } else {
            self.sink.show(text)?;
            self.visible = true;
        }

        Ok(RenderingResult::DONE)
    }

    fn flush(&mut self) {
        if let Err(e) = self.clear() {
            debug!("Failed to clear subtitle on flush: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::LoopOffset;
    use crate::sync::{ManualClock, RealTimePoint, TimeController, TrackDuration, TrackPosition};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Screen(Arc<Mutex<Vec<String>>>);

    impl SubtitleSink for Screen {
        fn show(&mut self, text: &str) -> Result<()> {
            self.0.lock().push(text.to_string());
            Ok(())
        }

        fn clear(&mut self) -> Result<()> {
            self.0.lock().push("<clear>".to_string());
            Ok(())
        }
    }

    fn cue(text: &str) -> Frame {
        Frame::text(
            LoopOffset::default(),
            text,
            TrackPosition::ZERO,
            TrackDuration::from_secs(1),
            0,
        )
    }

    fn render(renderer: &mut SubtitleRenderer, frame: Option<&Frame>) {
        let clock = ManualClock::new(RealTimePoint::ZERO);
        let controller = TimeController::new(clock.shared());
        let ctx = RenderContext {
            controller: &controller,
            now: RealTimePoint::ZERO,
            step_forced: false,
        };
        assert!(renderer.render_frame(frame, &ctx).unwrap().done);
    }

    #[test]
    fn test_cues_show_and_clear() {
        let screen = Screen::default();
        let mut renderer = SubtitleRenderer::new(screen.clone());

        render(&mut renderer, Some(&cue("one")));
        render(&mut renderer, Some(&cue("")));
        render(&mut renderer, Some(&cue("")));
        render(&mut renderer, Some(&cue("two")));
        render(&mut renderer, None);

        assert_eq!(
            *screen.0.lock(),
            vec!["one", "<clear>", "two", "<clear>"]
        );
    }
}
