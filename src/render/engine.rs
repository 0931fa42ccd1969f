//! Per-track frame scheduling loop

use crate::error::{AvSyncError, Result, SessionErrorKind};
use crate::media::{Frame, TrackType};
use crate::sync::{
    PlaybackRate, RealDuration, RealTimePoint, TimeController, TrackDuration, TrackPosition,
};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Identifies a renderer within a session
pub type RendererId = u64;

/// Upper bound on one scheduling sleep; the clock may be moved externally
const MAX_WAIT: Duration = Duration::from_millis(50);

/// Outcome of one presentation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderingResult {
    /// Whether the frame was consumed
    pub done: bool,
    /// When not done, how long to wait before trying the same frame again
    pub recheck_interval: RealDuration,
}

impl RenderingResult {
    pub const DONE: RenderingResult = RenderingResult {
        done: true,
        recheck_interval: RealDuration::ZERO,
    };

    pub const fn retry_after(recheck_interval: RealDuration) -> Self {
        Self {
            done: false,
            recheck_interval,
        }
    }
}

/// View of the scheduling state handed to a [`FrameRenderer`] on each attempt
#[derive(Debug)]
pub struct RenderContext<'a> {
    pub controller: &'a TimeController,
    pub now: RealTimePoint,
    /// The attempt was triggered by a force step
    pub step_forced: bool,
}

impl RenderContext<'_> {
    /// How late `frame` is at `now` (negative when early)
    pub fn frame_delay(&self, frame: &Frame) -> RealDuration {
        frame_delay(self.controller, frame, self.now)
    }
}

/// How late `frame` is at `time_point` according to `controller`
pub fn frame_delay(
    controller: &TimeController,
    frame: &Frame,
    time_point: RealTimePoint,
) -> RealDuration {
    time_point - controller.time_from_position(frame.absolute_pts(), false)
}

/// Media-specific presentation behind a [`Renderer`]
///
/// Implementations run on the renderer's own thread only.
pub trait FrameRenderer: Send + 'static {
    fn track_type(&self) -> TrackType;

    /// Present `frame`, or handle end of track when it is `None`
    ///
    /// Returning `done == false` asks for another attempt after the recheck
    /// interval. Errors are reported once to the session and stop presentation
    /// until the renderer is reconfigured.
    fn render_frame(&mut self, frame: Option<&Frame>, ctx: &RenderContext<'_>)
        -> Result<RenderingResult>;

    fn on_playback_rate_changed(&mut self, _rate: PlaybackRate) {}

    fn on_pause_changed(&mut self, _paused: bool) {}

    /// Drop anything buffered for frames that will no longer be presented
    fn flush(&mut self) {}
}

/// Lifecycle of a renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererState {
    /// Spawned, waiting for `start`
    Idle,
    /// Presenting frames
    Running,
    /// Presentation failed; waiting for reconfiguration
    Error(String),
    /// Stopped, no further frames accepted
    Stopped,
}

/// Notifications from a renderer thread
#[derive(Debug, Clone)]
pub enum RendererEvent {
    /// A frame was presented or dropped as stale
    FrameProcessed { id: RendererId, frame: Frame },
    /// A frame from a later loop iteration was presented
    LoopChanged {
        id: RendererId,
        loop_start: TrackDuration,
        index: i32,
    },
    /// A pending force step completed
    ForceStepDone { id: RendererId },
    /// The renderer re-anchored its time mapping
    Synchronized {
        id: RendererId,
        time_point: RealTimePoint,
        position: TrackPosition,
    },
    /// The end-of-track marker was consumed
    AtEnd { id: RendererId },
    /// Presentation failed
    Error {
        id: RendererId,
        kind: SessionErrorKind,
        description: String,
    },
}

impl RendererEvent {
    pub fn renderer_id(&self) -> RendererId {
        match self {
            RendererEvent::FrameProcessed { id, .. }
            | RendererEvent::LoopChanged { id, .. }
            | RendererEvent::ForceStepDone { id }
            | RendererEvent::Synchronized { id, .. }
            | RendererEvent::AtEnd { id }
            | RendererEvent::Error { id, .. } => *id,
        }
    }
}

type Reconfigure<R> = Box<dyn FnOnce(&mut R) -> Result<()> + Send>;

/// Work posted to a renderer thread
enum RendererCommand<R> {
    Render(Frame),
    FinalFrame,
    Start(TimeController),
    SyncSoft {
        time_point: RealTimePoint,
        position: TrackPosition,
    },
    SetPlaybackRate(PlaybackRate),
    SetPaused(bool),
    ForceStep,
    Flush(TrackPosition),
    ChangeRendererTime(RealDuration),
    Reconfigure(Reconfigure<R>, Option<Sender<Result<()>>>),
    Stop,
}

/// State readable from any thread
#[derive(Debug)]
struct RendererShared {
    seek_position: AtomicI64,
    last_position: AtomicI64,
    step_forced: AtomicBool,
    at_end: AtomicBool,
    state: Mutex<RendererState>,
}

/// Session-facing control of one track renderer
///
/// Every mutating call is posted to the renderer's thread and returns
/// immediately; results arrive as [`RendererEvent`]s.
pub trait TrackRenderer: Send + Sync {
    fn id(&self) -> RendererId;

    fn track_type(&self) -> TrackType;

    /// Queue a frame for presentation at its due time
    fn render(&self, frame: Frame) -> Result<()>;

    /// Queue the end-of-track marker
    fn on_final_frame_received(&self) -> Result<()>;

    /// Replace the time mapping and begin presenting
    fn start(&self, controller: TimeController) -> Result<()>;

    fn sync_soft(&self, time_point: RealTimePoint, position: TrackPosition) -> Result<()>;

    fn set_playback_rate(&self, rate: PlaybackRate) -> Result<()>;

    fn set_paused(&self, paused: bool) -> Result<()>;

    /// Present one frame immediately, regardless of timing or pause
    fn force_step(&self) -> Result<()>;

    /// Discard queued frames and restart bookkeeping at `seek_position`
    fn flush(&self, seek_position: TrackPosition) -> Result<()>;

    /// Shift the renderer's time mapping by `offset` and publish the new anchor
    fn change_renderer_time(&self, offset: RealDuration) -> Result<()>;

    fn seek_position(&self) -> TrackPosition;

    fn last_position(&self) -> TrackPosition;

    fn is_step_forced(&self) -> bool;

    fn is_at_end(&self) -> bool;

    fn state(&self) -> RendererState;

    /// Stop the thread; queued frames are discarded
    fn stop(&self);
}

/// Handle to a renderer thread driving a [`FrameRenderer`]
///
/// Clones control the same thread. The thread exits on [`stop`](TrackRenderer::stop)
/// or once every handle is dropped.
pub struct Renderer<R: FrameRenderer> {
    id: RendererId,
    track_type: TrackType,
    shared: Arc<RendererShared>,
    command_tx: Sender<RendererCommand<R>>,
    thread_id: ThreadId,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<R: FrameRenderer> Clone for Renderer<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            track_type: self.track_type,
            shared: Arc::clone(&self.shared),
            command_tx: self.command_tx.clone(),
            thread_id: self.thread_id,
            handle: Arc::clone(&self.handle),
        }
    }
}

impl<R: FrameRenderer> Renderer<R> {
    /// Start a renderer thread for `renderer`
    ///
    /// The renderer stays idle until [`start`](TrackRenderer::start) is called;
    /// a force step still presents a frame before that.
    pub fn spawn(
        id: RendererId,
        renderer: R,
        controller: TimeController,
        events: Sender<RendererEvent>,
    ) -> Result<Self> {
        let track_type = renderer.track_type();
        let position = controller.current_position();

        let shared = Arc::new(RendererShared {
            seek_position: AtomicI64::new(position.get()),
            last_position: AtomicI64::new(position.get()),
            step_forced: AtomicBool::new(false),
            at_end: AtomicBool::new(false),
            state: Mutex::new(RendererState::Idle),
        });

        let (command_tx, command_rx) = unbounded();

        let worker = Worker {
            id,
            renderer,
            shared: Arc::clone(&shared),
            controller,
            commands: command_rx,
            events,
            frames: VecDeque::new(),
            explicit_next_time: None,
            last_frame_end: position,
            loop_index: 0,
            started: false,
            paused: false,
            failed: false,
        };

        let handle = thread::Builder::new()
            .name(format!("avsync-{}-{}", track_type, id))
            .spawn(move || worker.run())?;

        debug!("Spawned {} renderer {}", track_type, id);

        Ok(Self {
            id,
            track_type,
            shared,
            command_tx,
            thread_id: handle.thread().id(),
            handle: Arc::new(Mutex::new(Some(handle))),
        })
    }

    /// Run `f` against the renderer on its own thread
    ///
    /// Blocks until `f` has run, so no frame is presented through the previous
    /// configuration after this returns. Called from the renderer's own thread
    /// it only queues `f`. A successful reconfiguration clears an error state.
    pub fn reconfigure<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut R) -> Result<()> + Send + 'static,
    {
        if thread::current().id() == self.thread_id {
            return self.send(RendererCommand::Reconfigure(Box::new(f), None));
        }

        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.send(RendererCommand::Reconfigure(Box::new(f), Some(ack_tx)))?;

        ack_rx
            .recv()
            .map_err(|_| AvSyncError::RendererStopped(self.id))?
    }

    fn send(&self, command: RendererCommand<R>) -> Result<()> {
        if *self.shared.state.lock() == RendererState::Stopped {
            return Err(AvSyncError::RendererStopped(self.id));
        }

        self.command_tx
            .send(command)
            .map_err(|_| AvSyncError::RendererStopped(self.id))
    }
}

impl<R: FrameRenderer> TrackRenderer for Renderer<R> {
    fn id(&self) -> RendererId {
        self.id
    }

    fn track_type(&self) -> TrackType {
        self.track_type
    }

    fn render(&self, frame: Frame) -> Result<()> {
        self.send(RendererCommand::Render(frame))
    }

    fn on_final_frame_received(&self) -> Result<()> {
        self.send(RendererCommand::FinalFrame)
    }

    fn start(&self, controller: TimeController) -> Result<()> {
        self.send(RendererCommand::Start(controller))
    }

    fn sync_soft(&self, time_point: RealTimePoint, position: TrackPosition) -> Result<()> {
        self.send(RendererCommand::SyncSoft {
            time_point,
            position,
        })
    }

    fn set_playback_rate(&self, rate: PlaybackRate) -> Result<()> {
        self.send(RendererCommand::SetPlaybackRate(rate))
    }

    fn set_paused(&self, paused: bool) -> Result<()> {
        self.send(RendererCommand::SetPaused(paused))
    }

    fn force_step(&self) -> Result<()> {
        if self
            .shared
            .step_forced
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // already pending
            return Ok(());
        }

        self.send(RendererCommand::ForceStep)
    }

    fn flush(&self, seek_position: TrackPosition) -> Result<()> {
        self.send(RendererCommand::Flush(seek_position))
    }

    fn change_renderer_time(&self, offset: RealDuration) -> Result<()> {
        self.send(RendererCommand::ChangeRendererTime(offset))
    }

    fn seek_position(&self) -> TrackPosition {
        TrackPosition::new(self.shared.seek_position.load(Ordering::Relaxed))
    }

    fn last_position(&self) -> TrackPosition {
        TrackPosition::new(self.shared.last_position.load(Ordering::Acquire))
    }

    fn is_step_forced(&self) -> bool {
        self.shared.step_forced.load(Ordering::Acquire)
    }

    fn is_at_end(&self) -> bool {
        self.shared.at_end.load(Ordering::Acquire)
    }

    fn state(&self) -> RendererState {
        self.shared.state.lock().clone()
    }

    fn stop(&self) {
        let _ = self.command_tx.send(RendererCommand::Stop);

        if thread::current().id() == self.thread_id {
            return;
        }

        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!("{} renderer {} thread panicked", self.track_type, self.id);
            }
        }
    }
}

impl<R: FrameRenderer> std::fmt::Debug for Renderer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("id", &self.id)
            .field("track_type", &self.track_type)
            .field("state", &self.state())
            .finish()
    }
}

/// Renderer thread state; only touched on the renderer thread
struct Worker<R: FrameRenderer> {
    id: RendererId,
    renderer: R,
    shared: Arc<RendererShared>,
    controller: TimeController,
    commands: Receiver<RendererCommand<R>>,
    events: Sender<RendererEvent>,
    /// Queued frames; `None` marks end of track
    frames: VecDeque<Option<Frame>>,
    explicit_next_time: Option<RealTimePoint>,
    last_frame_end: TrackPosition,
    loop_index: i32,
    started: bool,
    paused: bool,
    failed: bool,
}

impl<R: FrameRenderer> Worker<R> {
    fn run(mut self) {
        info!(
            "{} renderer {} thread started",
            self.renderer.track_type(),
            self.id
        );

        loop {
            let command = if self.can_do_next_step() {
                let interval = self.timer_interval().to_std();
                if interval.is_zero() {
                    match self.commands.try_recv() {
                        Ok(command) => Some(command),
                        Err(TryRecvError::Empty) => None,
                        Err(TryRecvError::Disconnected) => break,
                    }
                } else {
                    // wake up early on any command, then recompute the due time
                    match self.commands.recv_timeout(interval.min(MAX_WAIT)) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            } else {
                match self.commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            };

            match command {
                Some(RendererCommand::Stop) => break,
                Some(command) => self.handle_command(command),
                None => self.do_next_step(),
            }
        }

        let discarded = self.frames.len();
        self.frames.clear();
        *self.shared.state.lock() = RendererState::Stopped;

        info!(
            "{} renderer {} thread stopped ({} queued frames discarded)",
            self.renderer.track_type(),
            self.id,
            discarded
        );
    }

    fn handle_command(&mut self, command: RendererCommand<R>) {
        match command {
            RendererCommand::Render(frame) => self.enqueue(frame),
            RendererCommand::FinalFrame => self.frames.push_back(None),
            RendererCommand::Start(controller) => {
                self.controller = controller;
                self.controller.set_paused(self.paused);
                self.started = true;
                if !self.failed {
                    *self.shared.state.lock() = RendererState::Running;
                }
                debug!(
                    "Renderer {} started at {}",
                    self.id,
                    self.controller.current_position()
                );
            }
            RendererCommand::SyncSoft {
                time_point,
                position,
            } => {
                self.controller.sync_soft(time_point, position);
            }
            RendererCommand::SetPlaybackRate(rate) => {
                self.controller.set_playback_rate(rate);
                self.renderer.on_playback_rate_changed(rate);
            }
            RendererCommand::SetPaused(paused) => {
                self.paused = paused;
                self.controller.set_paused(paused);
                self.renderer.on_pause_changed(paused);
            }
            RendererCommand::ForceStep => {
                if self.is_at_end() {
                    self.set_force_step_done();
                } else {
                    self.explicit_next_time = Some(self.controller.now());
                }
            }
            RendererCommand::Flush(seek_position) => self.flush(seek_position),
            RendererCommand::ChangeRendererTime(offset) => self.change_renderer_time(offset),
            RendererCommand::Reconfigure(f, ack) => {
                let result = f(&mut self.renderer);
                if result.is_ok() && self.failed {
                    self.failed = false;
                    *self.shared.state.lock() = if self.started {
                        RendererState::Running
                    } else {
                        RendererState::Idle
                    };
                    info!("Renderer {} recovered after reconfiguration", self.id);
                }
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }
            RendererCommand::Stop => {}
        }
    }

    fn enqueue(&mut self, frame: Frame) {
        let seek_position = TrackPosition::new(self.shared.seek_position.load(Ordering::Relaxed));

        if frame.absolute_end() < seek_position {
            debug!(
                "Renderer {} dropping outdated frame: abs end {}, abs pts {}, seek {}",
                self.id,
                frame.absolute_end(),
                frame.absolute_pts(),
                seek_position
            );
            self.emit(RendererEvent::FrameProcessed { id: self.id, frame });
            return;
        }

        self.frames.push_back(Some(frame));
    }

    fn can_do_next_step(&self) -> bool {
        if self.frames.is_empty() || self.failed {
            return false;
        }
        if self.shared.step_forced.load(Ordering::Acquire) {
            return true;
        }
        self.started && !self.paused
    }

    /// Time left until the front of the queue is due
    fn timer_interval(&self) -> RealDuration {
        let due = match (self.explicit_next_time, self.frames.front()) {
            (_, None) => return RealDuration::ZERO,
            (Some(time), _) => time,
            (None, Some(Some(frame))) => {
                self.controller.time_from_position(frame.absolute_pts(), false)
            }
            (None, Some(None)) if self.last_frame_end > TrackPosition::ZERO => self
                .controller
                .time_from_position(self.last_frame_end, false),
            (None, Some(None)) => return RealDuration::ZERO,
        };

        (due - self.controller.now()).max(RealDuration::ZERO)
    }

    fn do_next_step(&mut self) {
        let Some(frame) = self.frames.front().cloned() else {
            return;
        };

        let step_forced = self.set_force_step_done();
        let now = self.controller.now();
        let ctx = RenderContext {
            controller: &self.controller,
            now,
            step_forced,
        };

        let result = match self.renderer.render_frame(frame.as_ref(), &ctx) {
            Ok(result) => result,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        let is_end_marker = frame.is_none();

        if result.done {
            self.explicit_next_time = None;
            self.frames.pop_front();

            match frame {
                Some(frame) => {
                    let last = self.shared.last_position.load(Ordering::Relaxed);
                    self.shared
                        .last_position
                        .store(frame.absolute_pts().get().max(last), Ordering::Release);

                    self.last_frame_end = frame.absolute_end();
                    self.shared
                        .seek_position
                        .store(self.last_frame_end.get(), Ordering::Relaxed);

                    let loop_offset = frame.loop_offset();
                    if self.loop_index < loop_offset.index {
                        self.loop_index = loop_offset.index;
                        debug!(
                            "Renderer {} entered loop {} at {}",
                            self.id, loop_offset.index, loop_offset.pos
                        );
                        self.emit(RendererEvent::LoopChanged {
                            id: self.id,
                            loop_start: loop_offset.pos,
                            index: loop_offset.index,
                        });
                    }

                    trace!("Renderer {} presented frame at {}", self.id, frame.absolute_pts());
                    self.emit(RendererEvent::FrameProcessed { id: self.id, frame });
                }
                None => {
                    let last = self.shared.last_position.load(Ordering::Relaxed);
                    self.shared
                        .last_position
                        .store(self.last_frame_end.get().max(last), Ordering::Release);
                }
            }
        } else {
            self.explicit_next_time = Some(now + result.recheck_interval);
        }

        self.set_at_end(result.done && is_end_marker);
    }

    /// Clear a pending force step; true if one was pending
    fn set_force_step_done(&mut self) -> bool {
        if self
            .shared
            .step_forced
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.explicit_next_time = None;
        debug!("Renderer {} force step done", self.id);
        self.emit(RendererEvent::ForceStepDone { id: self.id });
        true
    }

    fn is_at_end(&self) -> bool {
        self.shared.at_end.load(Ordering::Acquire)
    }

    fn set_at_end(&mut self, at_end: bool) {
        if self.shared.at_end.swap(at_end, Ordering::AcqRel) != at_end && at_end {
            info!("Renderer {} reached end of track", self.id);
            self.emit(RendererEvent::AtEnd { id: self.id });
        }
    }

    fn flush(&mut self, seek_position: TrackPosition) {
        let discarded = self.frames.len();
        self.frames.clear();
        self.explicit_next_time = None;
        self.last_frame_end = seek_position;
        self.shared
            .seek_position
            .store(seek_position.get(), Ordering::Relaxed);
        self.shared
            .last_position
            .store(seek_position.get(), Ordering::Release);
        self.shared.at_end.store(false, Ordering::Release);
        self.renderer.flush();

        debug!(
            "Renderer {} flushed {} frames, seek position {}",
            self.id, discarded, seek_position
        );
    }

    fn change_renderer_time(&mut self, offset: RealDuration) {
        let now = self.controller.now();
        let position = self.controller.position_from_time(now, false);
        let time_point = now + offset;

        self.controller.sync_at(time_point, position);
        self.emit(RendererEvent::Synchronized {
            id: self.id,
            time_point,
            position,
        });
    }

    fn fail(&mut self, e: AvSyncError) {
        error!("Renderer {} failed: {}", self.id, e);

        self.failed = true;
        *self.shared.state.lock() = RendererState::Error(e.to_string());
        self.emit(RendererEvent::Error {
            id: self.id,
            kind: e.kind(),
            description: e.to_string(),
        });
    }

    fn emit(&self, event: RendererEvent) {
        if self.events.send(event).is_err() {
            warn!("Renderer {} event receiver dropped", self.id);
        }
    }
}
