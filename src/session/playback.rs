//! Playback session: one time mapping driving every track renderer

use crate::config::PlaybackConfig;
use crate::error::{AvSyncError, Result, SessionErrorKind};
use crate::media::{LoopOffset, TrackType};
use crate::render::{FrameRenderer, Renderer, RendererEvent, RendererId, TrackRenderer};
use crate::sync::{PlaybackRate, SharedClock, TimeController, TrackPosition};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Notifications for the owner of a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Presentation advanced to a new position
    PositionChanged(TrackPosition),
    /// Playback entered a new loop iteration
    LoopChanged(LoopOffset),
    /// Every renderer reached the end of its track
    EndOfStream,
    /// A renderer failed; reported once per renderer
    Error {
        kind: SessionErrorKind,
        description: String,
    },
}

/// Owns the master [`TimeController`] and fans control out to the renderers
///
/// Renderer events are collected on one channel and turned into
/// [`SessionEvent`]s by [`handle_event`](PlaybackSession::handle_event).
pub struct PlaybackSession {
    config: PlaybackConfig,
    controller: TimeController,
    renderers: Vec<Box<dyn TrackRenderer>>,
    state: PlaybackState,
    loop_offset: LoopOffset,
    position: TrackPosition,
    next_id: RendererId,
    shut_down: bool,
    finished: HashSet<RendererId>,
    failed: HashSet<RendererId>,
    event_tx: Sender<RendererEvent>,
    event_rx: Receiver<RendererEvent>,
}

impl PlaybackSession {
    pub fn new(config: PlaybackConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;

        let mut controller = TimeController::new(clock).with_fixing_time(config.fixing_time());
        controller.set_paused(true);
        controller.set_playback_rate(config.playback_rate);

        let (event_tx, event_rx) = unbounded();

        Ok(Self {
            config,
            controller,
            renderers: Vec::new(),
            state: PlaybackState::Stopped,
            loop_offset: LoopOffset::default(),
            position: TrackPosition::ZERO,
            next_id: 1,
            shut_down: false,
            finished: HashSet::new(),
            failed: HashSet::new(),
            event_tx,
            event_rx,
        })
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Sender to hand to renderers spawned outside the session
    pub fn renderer_event_sender(&self) -> Sender<RendererEvent> {
        self.event_tx.clone()
    }

    /// Allocate an id for a renderer spawned outside the session
    pub fn next_renderer_id(&mut self) -> RendererId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Spawn a renderer thread for `renderer` and attach it to the session
    ///
    /// The returned handle shares the thread with the session, so it can be
    /// used to feed frames and to reconfigure the output.
    pub fn spawn_renderer<R: FrameRenderer>(&mut self, renderer: R) -> Result<Renderer<R>> {
        self.ensure_active()?;
        let id = self.next_renderer_id();
        let handle = Renderer::spawn(
            id,
            renderer,
            self.controller.clone(),
            self.event_tx.clone(),
        )?;
        self.add_renderer(handle.clone())?;
        Ok(handle)
    }

    /// Attach a renderer, replacing (and stopping) any renderer of the same track type
    pub fn add_renderer(&mut self, renderer: impl TrackRenderer + 'static) -> Result<()> {
        self.ensure_active()?;
        let track = renderer.track_type();

        if let Some(index) = self.renderers.iter().position(|r| r.track_type() == track) {
            let old = self.renderers.remove(index);
            info!("Replacing {} renderer {}", track, old.id());
            self.finished.remove(&old.id());
            self.failed.remove(&old.id());
            old.stop();
        }

        renderer.set_playback_rate(self.controller.playback_rate())?;
        match self.state {
            PlaybackState::Stopped => {}
            PlaybackState::Playing => renderer.start(self.controller.clone())?,
            PlaybackState::Paused => {
                renderer.set_paused(true)?;
                renderer.start(self.controller.clone())?;
            }
        }

        debug!("Added {} renderer {}", track, renderer.id());
        self.renderers.push(Box::new(renderer));
        Ok(())
    }

    pub fn renderer(&self, track: TrackType) -> Option<&dyn TrackRenderer> {
        self.renderers
            .iter()
            .find(|r| r.track_type() == track)
            .map(|r| r.as_ref())
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn playback_rate(&self) -> PlaybackRate {
        self.controller.playback_rate()
    }

    /// Current position on the loop-adjusted timeline
    pub fn position(&self) -> TrackPosition {
        self.controller.current_position()
    }

    pub fn loop_offset(&self) -> LoopOffset {
        self.loop_offset
    }

    /// Start or resume playback
    pub fn play(&mut self) -> Result<()> {
        self.ensure_active()?;
        if self.state == PlaybackState::Playing {
            return Ok(());
        }

        if self.state == PlaybackState::Stopped {
            self.controller.sync(self.controller.current_position());
            self.finished.clear();
        }

        self.controller.set_paused(false);
        for renderer in &self.renderers {
            renderer.set_paused(false)?;
            renderer.start(self.controller.clone())?;
        }

        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Pause playback; from stopped this prepares the first frame
    pub fn pause(&mut self) -> Result<()> {
        self.ensure_active()?;
        match self.state {
            PlaybackState::Paused => return Ok(()),
            PlaybackState::Playing => {
                self.controller.set_paused(true);
                for renderer in &self.renderers {
                    renderer.set_paused(true)?;
                }
            }
            PlaybackState::Stopped => {
                self.finished.clear();
                for renderer in &self.renderers {
                    renderer.set_paused(true)?;
                    renderer.start(self.controller.clone())?;
                    renderer.force_step()?;
                }
            }
        }

        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    /// Stop playback and rewind to the start
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_active()?;
        if self.state == PlaybackState::Stopped {
            return Ok(());
        }

        self.controller.set_paused(true);
        self.controller.sync(TrackPosition::ZERO);
        for renderer in &self.renderers {
            renderer.set_paused(true)?;
            renderer.flush(TrackPosition::ZERO)?;
        }

        self.loop_offset = LoopOffset::default();
        self.position = TrackPosition::ZERO;
        self.finished.clear();
        self.set_state(PlaybackState::Stopped);
        Ok(())
    }

    /// Jump to `position` within the current loop, discarding everything
    /// queued before it
    ///
    /// The renderers and the session clock continue on the loop-adjusted
    /// timeline, so the target is `position` plus the current loop start.
    /// The caller feeds frames from the new position afterwards. While paused,
    /// one frame is presented right away if `force_step_on_seek` is set.
    pub fn seek(&mut self, position: TrackPosition) -> Result<()> {
        self.ensure_active()?;
        let position = self.loop_offset.pos.as_position() + position.as_duration();
        info!(
            "Seeking to {} (loop {})",
            position, self.loop_offset.index
        );

        self.controller.sync(position);
        self.position = position;
        self.finished.clear();

        for renderer in &self.renderers {
            renderer.flush(position)?;
            if self.state != PlaybackState::Stopped {
                renderer.start(self.controller.clone())?;
            }
        }

        if self.state == PlaybackState::Paused && self.config.force_step_on_seek {
            for renderer in &self.renderers {
                renderer.force_step()?;
            }
        }

        Ok(())
    }

    /// Change the playback rate of the session and every renderer
    pub fn set_playback_rate(&mut self, rate: PlaybackRate) -> Result<()> {
        self.ensure_active()?;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(AvSyncError::InvalidConfig(format!(
                "playback rate must be positive, got {}",
                rate
            )));
        }

        self.controller.set_playback_rate(rate);
        for renderer in &self.renderers {
            renderer.set_playback_rate(rate)?;
        }

        info!("Playback rate set to {}", rate);
        Ok(())
    }

    /// Wait up to `timeout` for the next renderer event and process it
    ///
    /// `Ok(None)` means either nothing arrived or the event needs no reaction
    /// from the owner.
    pub fn poll_event(&mut self, timeout: Duration) -> Result<Option<SessionEvent>> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Ok(self.handle_event(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(AvSyncError::ChannelError(
                "renderer event channel closed".to_string(),
            )),
        }
    }

    /// React to one renderer event
    ///
    /// Events from renderers that are no longer attached are ignored.
    pub fn handle_event(&mut self, event: RendererEvent) -> Option<SessionEvent> {
        let id = event.renderer_id();
        let Some(track) = self
            .renderers
            .iter()
            .find(|r| r.id() == id)
            .map(|r| r.track_type())
        else {
            debug!("Ignoring event from detached renderer {}", id);
            return None;
        };

        match event {
            RendererEvent::FrameProcessed { id, frame } => {
                // presenting again means a failed renderer was reconfigured
                self.failed.remove(&id);

                let position = frame.absolute_pts();
                if position > self.position {
                    self.position = position;
                    Some(SessionEvent::PositionChanged(position))
                } else {
                    None
                }
            }
            RendererEvent::LoopChanged {
                id,
                loop_start,
                index,
            } => {
                let offset = LoopOffset::new(loop_start, index);
                if index == self.loop_offset.index && loop_start != self.loop_offset.pos {
                    warn!(
                        "Renderer {} reports loop {} starting at {}, expected {}",
                        id, index, loop_start, self.loop_offset.pos
                    );
                    self.loop_offset = offset;
                    return None;
                }
                if index <= self.loop_offset.index {
                    return None;
                }

                self.loop_offset = offset;

                info!("Loop {} started at {}", index, loop_start);
                Some(SessionEvent::LoopChanged(offset))
            }
            RendererEvent::ForceStepDone { id } => {
                debug!("Renderer {} completed force step", id);
                None
            }
            RendererEvent::Synchronized {
                id,
                time_point,
                position,
            } => {
                if track != TrackType::Audio {
                    warn!(
                        "Ignoring synchronization from {} renderer {}",
                        track, id
                    );
                    return None;
                }

                debug!(
                    "Renderer {} synchronized {} to {}",
                    id, position, time_point
                );
                self.controller.sync_at(time_point, position);
                for renderer in self.renderers.iter().filter(|r| r.id() != id) {
                    if let Err(e) = renderer.sync_soft(time_point, position) {
                        warn!("Failed to sync renderer {}: {}", renderer.id(), e);
                    }
                }
                None
            }
            RendererEvent::AtEnd { id } => {
                self.finished.insert(id);
                let all_finished = self
                    .renderers
                    .iter()
                    .all(|r| self.finished.contains(&r.id()));

                if all_finished && self.state != PlaybackState::Stopped {
                    info!("End of stream");
                    self.controller.set_paused(true);
                    for renderer in &self.renderers {
                        if let Err(e) = renderer.set_paused(true) {
                            warn!("Failed to pause renderer {}: {}", renderer.id(), e);
                        }
                    }
                    self.set_state(PlaybackState::Stopped);
                    Some(SessionEvent::EndOfStream)
                } else {
                    None
                }
            }
            RendererEvent::Error {
                id,
                kind,
                description,
            } => {
                if self.failed.insert(id) {
                    Some(SessionEvent::Error { kind, description })
                } else {
                    None
                }
            }
        }
    }

    /// Stop every renderer thread
    ///
    /// Control calls made afterwards fail with [`AvSyncError::NotRunning`].
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        for renderer in self.renderers.drain(..) {
            renderer.stop();
        }
        self.shut_down = true;
        self.state = PlaybackState::Stopped;
        info!("Playback session shut down");
    }

    fn ensure_active(&self) -> Result<()> {
        if self.shut_down {
            Err(AvSyncError::NotRunning)
        } else {
            Ok(())
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            info!("Playback state: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Frame;
    use crate::render::{RendererState, SubtitleRenderer, SubtitleSink};
    use crate::sync::{
        Clock, ManualClock, RealDuration, RealTimePoint, SystemClock, TrackDuration,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every control call instead of running a thread
    #[derive(Clone)]
    struct FakeRenderer {
        id: RendererId,
        track: TrackType,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeRenderer {
        fn new(id: RendererId, track: TrackType) -> Self {
            Self {
                id,
                track,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn log(&self, call: String) -> Result<()> {
            self.calls.lock().push(call);
            Ok(())
        }

        fn take_calls(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock())
        }
    }

    impl TrackRenderer for FakeRenderer {
        fn id(&self) -> RendererId {
            self.id
        }

        fn track_type(&self) -> TrackType {
            self.track
        }

        fn render(&self, frame: Frame) -> Result<()> {
            self.log(format!("render({})", frame.pts().get()))
        }

        fn on_final_frame_received(&self) -> Result<()> {
            self.log("final".to_string())
        }

        fn start(&self, controller: TimeController) -> Result<()> {
            self.log(format!("start({})", controller.current_position().get()))
        }

        fn sync_soft(&self, time_point: RealTimePoint, position: TrackPosition) -> Result<()> {
            self.log(format!("sync_soft({}, {})", time_point.get(), position.get()))
        }

        fn set_playback_rate(&self, rate: PlaybackRate) -> Result<()> {
            self.log(format!("rate({})", rate))
        }

        fn set_paused(&self, paused: bool) -> Result<()> {
            self.log(format!("paused({})", paused))
        }

        fn force_step(&self) -> Result<()> {
            self.log("force_step".to_string())
        }

        fn flush(&self, seek_position: TrackPosition) -> Result<()> {
            self.log(format!("flush({})", seek_position.get()))
        }

        fn change_renderer_time(&self, offset: RealDuration) -> Result<()> {
            self.log(format!("change_time({})", offset.get()))
        }

        fn seek_position(&self) -> TrackPosition {
            TrackPosition::ZERO
        }

        fn last_position(&self) -> TrackPosition {
            TrackPosition::ZERO
        }

        fn is_step_forced(&self) -> bool {
            false
        }

        fn is_at_end(&self) -> bool {
            false
        }

        fn state(&self) -> RendererState {
            RendererState::Idle
        }

        fn stop(&self) {
            self.calls.lock().push("stop".to_string());
        }
    }

    fn session_with(config: PlaybackConfig) -> (ManualClock, PlaybackSession) {
        let clock = ManualClock::new(RealTimePoint::new(10_000_000));
        let session = PlaybackSession::new(config, clock.shared()).unwrap();
        (clock, session)
    }

    fn session() -> (ManualClock, PlaybackSession) {
        session_with(PlaybackConfig::default())
    }

    #[test]
    fn test_seek_while_paused_forces_a_step() {
        let (_clock, mut session) = session();
        let video = FakeRenderer::new(1, TrackType::Video);
        session.add_renderer(video.clone()).unwrap();
        assert_eq!(video.take_calls(), vec!["rate(1)"]);

        session.pause().unwrap();
        assert_eq!(session.state(), PlaybackState::Paused);
        assert_eq!(
            video.take_calls(),
            vec!["paused(true)", "start(0)", "force_step"]
        );

        session.seek(TrackPosition::new(5_000_000)).unwrap();
        assert_eq!(
            video.take_calls(),
            vec!["flush(5000000)", "start(5000000)", "force_step"]
        );
        assert_eq!(session.position(), TrackPosition::new(5_000_000));
    }

    #[test]
    fn test_seek_without_force_step() {
        let (_clock, mut session) = session_with(PlaybackConfig {
            force_step_on_seek: false,
            ..PlaybackConfig::default()
        });
        let audio = FakeRenderer::new(1, TrackType::Audio);
        session.add_renderer(audio.clone()).unwrap();
        session.play().unwrap();
        session.pause().unwrap();
        audio.take_calls();

        session.seek(TrackPosition::new(1_000)).unwrap();
        assert_eq!(audio.take_calls(), vec!["flush(1000)", "start(1000)"]);
    }

    #[test]
    fn test_play_advances_position() {
        let (clock, mut session) = session();
        session.play().unwrap();
        clock.advance(RealDuration::from_millis(1_500));
        assert_eq!(session.position(), TrackPosition::new(1_500_000));

        session.pause().unwrap();
        clock.advance(RealDuration::from_millis(1_000));
        assert_eq!(session.position(), TrackPosition::new(1_500_000));

        session.stop().unwrap();
        assert_eq!(session.position(), TrackPosition::ZERO);
    }

    #[test]
    fn test_replacing_renderer_stops_the_old_one() {
        let (_clock, mut session) = session();
        let first = FakeRenderer::new(1, TrackType::Video);
        let second = FakeRenderer::new(2, TrackType::Video);
        session.add_renderer(first.clone()).unwrap();
        session.add_renderer(second).unwrap();

        assert_eq!(first.take_calls().last().map(String::as_str), Some("stop"));
        assert_eq!(session.renderer(TrackType::Video).map(|r| r.id()), Some(2));
    }

    #[test]
    fn test_loop_changes_are_aggregated() {
        let (_clock, mut session) = session();
        session
            .add_renderer(FakeRenderer::new(1, TrackType::Audio))
            .unwrap();
        session
            .add_renderer(FakeRenderer::new(2, TrackType::Video))
            .unwrap();
        let loop_one = |id, secs| RendererEvent::LoopChanged {
            id,
            loop_start: TrackDuration::from_secs(secs),
            index: 1,
        };

        assert_eq!(
            session.handle_event(loop_one(1, 10)),
            Some(SessionEvent::LoopChanged(LoopOffset::new(
                TrackDuration::from_secs(10),
                1
            )))
        );
        // second renderer reaching the same loop
        assert_eq!(session.handle_event(loop_one(2, 10)), None);
        // same loop, different start: adopted without a new loop event
        assert_eq!(session.handle_event(loop_one(2, 11)), None);
        assert_eq!(session.loop_offset().pos, TrackDuration::from_secs(11));
        assert_eq!(session.loop_offset().index, 1);

        let older = RendererEvent::LoopChanged {
            id: 1,
            loop_start: TrackDuration::ZERO,
            index: 0,
        };
        assert_eq!(session.handle_event(older), None);
        assert_eq!(session.loop_offset().index, 1);
    }

    #[test]
    fn test_synchronized_renderer_resyncs_the_others() {
        let (clock, mut session) = session();
        let audio = FakeRenderer::new(1, TrackType::Audio);
        let video = FakeRenderer::new(2, TrackType::Video);
        session.add_renderer(audio.clone()).unwrap();
        session.add_renderer(video.clone()).unwrap();
        session.play().unwrap();
        audio.take_calls();
        video.take_calls();

        let time_point = clock.now() + RealDuration::from_millis(40);
        let event = RendererEvent::Synchronized {
            id: 1,
            time_point,
            position: TrackPosition::new(1_000_000),
        };
        assert_eq!(session.handle_event(event), None);

        assert!(audio.take_calls().is_empty());
        assert_eq!(
            video.take_calls(),
            vec![format!("sync_soft({}, 1000000)", time_point.get())]
        );
        assert_eq!(session.position(), TrackPosition::new(960_000));
    }

    #[test]
    fn test_events_from_replaced_renderer_are_ignored() {
        let (_clock, mut session) = session();
        session
            .add_renderer(FakeRenderer::new(1, TrackType::Audio))
            .unwrap();
        session
            .add_renderer(FakeRenderer::new(2, TrackType::Audio))
            .unwrap();

        let stale_sync = RendererEvent::Synchronized {
            id: 1,
            time_point: RealTimePoint::new(10_000_000),
            position: TrackPosition::new(99_000_000),
        };
        assert_eq!(session.handle_event(stale_sync), None);
        assert_eq!(session.position(), TrackPosition::ZERO);

        let stale_error = RendererEvent::Error {
            id: 1,
            kind: SessionErrorKind::Device,
            description: "old".to_string(),
        };
        assert_eq!(session.handle_event(stale_error), None);
        assert_eq!(session.handle_event(RendererEvent::AtEnd { id: 1 }), None);
    }

    #[test]
    fn test_only_audio_may_synchronize() {
        let (clock, mut session) = session();
        let video = FakeRenderer::new(1, TrackType::Video);
        let subtitles = FakeRenderer::new(2, TrackType::Subtitle);
        session.add_renderer(video.clone()).unwrap();
        session.add_renderer(subtitles.clone()).unwrap();
        subtitles.take_calls();

        let event = RendererEvent::Synchronized {
            id: 1,
            time_point: clock.now(),
            position: TrackPosition::new(7_000_000),
        };
        assert_eq!(session.handle_event(event), None);
        assert_eq!(session.position(), TrackPosition::ZERO);
        assert!(subtitles.take_calls().is_empty());
    }

    #[test]
    fn test_seek_is_relative_to_the_current_loop() {
        let (_clock, mut session) = session();
        let video = FakeRenderer::new(1, TrackType::Video);
        session.add_renderer(video.clone()).unwrap();
        session.pause().unwrap();
        session.handle_event(RendererEvent::LoopChanged {
            id: 1,
            loop_start: TrackDuration::from_secs(10),
            index: 1,
        });
        video.take_calls();

        session.seek(TrackPosition::new(2_000_000)).unwrap();
        assert_eq!(
            video.take_calls(),
            vec!["flush(12000000)", "start(12000000)", "force_step"]
        );
        assert_eq!(session.position(), TrackPosition::new(12_000_000));
    }

    #[test]
    fn test_control_after_shutdown_fails() {
        let (_clock, mut session) = session();
        let audio = FakeRenderer::new(1, TrackType::Audio);
        session.add_renderer(audio.clone()).unwrap();
        session.shutdown();
        assert_eq!(audio.take_calls().last().map(String::as_str), Some("stop"));

        assert!(matches!(session.play(), Err(AvSyncError::NotRunning)));
        assert!(matches!(
            session.seek(TrackPosition::ZERO),
            Err(AvSyncError::NotRunning)
        ));
        assert!(matches!(
            session.add_renderer(FakeRenderer::new(2, TrackType::Video)),
            Err(AvSyncError::NotRunning)
        ));
        // a second shutdown is harmless
        session.shutdown();
        assert!(audio.take_calls().is_empty());
    }

    #[test]
    fn test_end_of_stream_needs_every_renderer() {
        let (_clock, mut session) = session();
        session
            .add_renderer(FakeRenderer::new(1, TrackType::Audio))
            .unwrap();
        session
            .add_renderer(FakeRenderer::new(2, TrackType::Video))
            .unwrap();
        session.play().unwrap();

        assert_eq!(session.handle_event(RendererEvent::AtEnd { id: 1 }), None);
        assert_eq!(
            session.handle_event(RendererEvent::AtEnd { id: 2 }),
            Some(SessionEvent::EndOfStream)
        );
        assert_eq!(session.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_errors_are_reported_once_per_renderer() {
        let (_clock, mut session) = session();
        session
            .add_renderer(FakeRenderer::new(3, TrackType::Audio))
            .unwrap();
        let error = || RendererEvent::Error {
            id: 3,
            kind: SessionErrorKind::Device,
            description: "unplugged".to_string(),
        };

        assert_eq!(
            session.handle_event(error()),
            Some(SessionEvent::Error {
                kind: SessionErrorKind::Device,
                description: "unplugged".to_string(),
            })
        );
        assert_eq!(session.handle_event(error()), None);
    }

    #[test]
    fn test_playback_rate_is_validated_and_forwarded() {
        let (_clock, mut session) = session();
        let video = FakeRenderer::new(1, TrackType::Video);
        session.add_renderer(video.clone()).unwrap();
        video.take_calls();

        assert!(session.set_playback_rate(0.0).is_err());
        assert!(session.set_playback_rate(-1.0).is_err());
        session.set_playback_rate(2.0).unwrap();

        assert_eq!(session.playback_rate(), 2.0);
        assert_eq!(video.take_calls(), vec!["rate(2)"]);
    }

    #[derive(Clone, Default)]
    struct Screen(Arc<Mutex<Vec<String>>>);

    impl SubtitleSink for Screen {
        fn show(&mut self, text: &str) -> Result<()> {
            self.0.lock().push(text.to_string());
            Ok(())
        }

        fn clear(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_threaded_renderer_reaches_end_of_stream() {
        let mut session =
            PlaybackSession::new(PlaybackConfig::default(), SystemClock::shared()).unwrap();
        let screen = Screen::default();
        let subtitles = session
            .spawn_renderer(SubtitleRenderer::new(screen.clone()))
            .unwrap();

        session.play().unwrap();
        subtitles
            .render(Frame::text(
                LoopOffset::default(),
                "hello",
                TrackPosition::ZERO,
                TrackDuration::from_millis(20),
                0,
            ))
            .unwrap();
        subtitles.on_final_frame_received().unwrap();

        let mut events = Vec::new();
        for _ in 0..100 {
            if let Some(event) = session.poll_event(Duration::from_millis(20)).unwrap() {
                let done = event == SessionEvent::EndOfStream;
                events.push(event);
                if done {
                    break;
                }
            }
        }

        assert_eq!(events.last(), Some(&SessionEvent::EndOfStream));
        assert_eq!(*screen.0.lock(), vec!["hello"]);
        session.shutdown();
        assert_eq!(subtitles.state(), RendererState::Stopped);
    }
}
