//! Mapping between real clock time and track position

use crate::sync::clock::SharedClock;
use crate::sync::time::{RealDuration, RealTimePoint, TrackDuration, TrackPosition};
use tracing::{debug, trace};

/// Playback speed multiplier (track time per real time)
pub type PlaybackRate = f32;

/// Default window over which a soft sync converges
pub const DEFAULT_FIXING_TIME: RealDuration = RealDuration::from_millis(4000);

/// Pending gradual correction of the time mapping
#[derive(Debug, Clone, Copy)]
struct SoftSyncData {
    src_time_point: RealTimePoint,
    src_position: TrackPosition,
    dst_time_point: RealTimePoint,
    /// Offset of the corrected curve from the new anchor line at the source time
    src_pos_offset: TrackDuration,
    dst_position: TrackPosition,
    internal_rate: f64,
}

/// Converts between real clock time and track position
///
/// The only persisted state is one anchor pair `(time_point, position)`; every
/// query is computed from it. Changing the rate or pausing first scrolls the
/// anchor to "now" under the old parameters, so history never needs rewriting:
///
/// `position(t) = anchor_position + (t - anchor_time) * rate`
///
/// A soft sync moves the anchor immediately but bends queries inside the fixing
/// window so the reported position glides from the old prediction to the new
/// one instead of jumping.
///
/// Cloning yields an independent snapshot bound to the same clock.
#[derive(Debug, Clone)]
pub struct TimeController {
    clock: SharedClock,
    paused: bool,
    playback_rate: PlaybackRate,
    position: TrackPosition,
    time_point: RealTimePoint,
    fixing_time: RealDuration,
    soft_sync: Option<SoftSyncData>,
}

impl TimeController {
    /// Create a running controller anchored at (now, 0) with rate 1.0
    pub fn new(clock: SharedClock) -> Self {
        let time_point = clock.now();
        Self {
            clock,
            paused: false,
            playback_rate: 1.0,
            position: TrackPosition::ZERO,
            time_point,
            fixing_time: DEFAULT_FIXING_TIME,
            soft_sync: None,
        }
    }

    /// Override the default soft sync fixing time
    pub fn with_fixing_time(mut self, fixing_time: RealDuration) -> Self {
        self.fixing_time = fixing_time;
        self
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Current instant on the controller's clock
    pub fn now(&self) -> RealTimePoint {
        self.clock.now()
    }

    pub fn playback_rate(&self) -> PlaybackRate {
        self.playback_rate
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn fixing_time(&self) -> RealDuration {
        self.fixing_time
    }

    /// Anchor pair `(time_point, position)` the mapping is computed from
    pub fn anchor(&self) -> (RealTimePoint, TrackPosition) {
        (self.time_point, self.position)
    }

    /// Whether a soft sync window is still open at `time_point`
    pub fn is_soft_syncing(&self, time_point: RealTimePoint) -> bool {
        self.soft_sync
            .is_some_and(|soft| time_point < soft.dst_time_point)
    }

    /// Change the playback rate from now on
    ///
    /// # Panics
    /// If `rate` is not a finite positive number.
    pub fn set_playback_rate(&mut self, rate: PlaybackRate) {
        assert!(
            rate.is_finite() && rate > 0.0,
            "playback rate must be positive, got {}",
            rate
        );

        if rate == self.playback_rate {
            return;
        }

        let now = self.clock.now();
        let current = self.position_from_time(now, false);

        self.scroll_time_till(now);
        self.playback_rate = rate;

        if let Some(soft) = self.soft_sync {
            self.soft_sync = self.make_soft_sync_data(now, current, soft.dst_time_point);
        }

        debug!("Playback rate set to {} at {}", rate, current);
    }

    /// Hard sync: anchor `position` at the current instant
    pub fn sync(&mut self, position: TrackPosition) {
        let now = self.clock.now();
        self.sync_at(now, position);
    }

    /// Hard sync: anchor `(time_point, position)`, cancelling any soft sync
    pub fn sync_at(&mut self, time_point: RealTimePoint, position: TrackPosition) {
        self.soft_sync = None;
        self.position = position;
        self.time_point = time_point;
    }

    /// Soft sync over the configured fixing time
    pub fn sync_soft(&mut self, time_point: RealTimePoint, position: TrackPosition) {
        self.sync_soft_with(time_point, position, self.fixing_time);
    }

    /// Soft sync: re-anchor now, converge queries over `fixing_time`
    ///
    /// A zero (or negative) fixing time, or a correction that cannot be reached
    /// with a positive internal rate, degrades to a hard sync.
    pub fn sync_soft_with(
        &mut self,
        time_point: RealTimePoint,
        position: TrackPosition,
        fixing_time: RealDuration,
    ) {
        let src_time = self.clock.now();
        let src_position = self.position_from_time(src_time, true);
        let dst_time = src_time + fixing_time;

        self.position = position;
        self.time_point = time_point;

        self.soft_sync = self.make_soft_sync_data(src_time, src_position, dst_time);

        match &self.soft_sync {
            Some(soft) => debug!(
                "Soft sync from {} to {} over {}, internal rate {:.4}",
                src_position, soft.dst_position, fixing_time, soft.internal_rate
            ),
            None => debug!("Soft sync to {} applied as hard sync", position),
        }
    }

    /// Track position at the current instant
    pub fn current_position(&self) -> TrackPosition {
        self.current_position_with_offset(RealDuration::ZERO)
    }

    /// Track position at `now + offset`
    pub fn current_position_with_offset(&self, offset: RealDuration) -> TrackPosition {
        self.position_from_time(self.clock.now() + offset, false)
    }

    /// Pause or resume; the position is frozen while paused
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }

        let now = self.clock.now();
        self.scroll_time_till(now);
        self.paused = paused;

        trace!("Time controller paused={} at {}", paused, self.position);
    }

    /// Track position at `time_point`
    ///
    /// While paused (and not `ignore_pause`) this is the frozen position,
    /// whatever `time_point` is.
    pub fn position_from_time(
        &self,
        time_point: RealTimePoint,
        ignore_pause: bool,
    ) -> TrackPosition {
        let time_point = if self.paused && !ignore_pause {
            self.time_point
        } else {
            time_point
        };

        if let Some(soft) = &self.soft_sync {
            if time_point < soft.dst_time_point {
                let rate = if time_point > soft.src_time_point {
                    soft.internal_rate
                } else {
                    self.playback_rate as f64
                };

                return soft.src_position
                    + to_track_duration(time_point - soft.src_time_point, rate);
            }
        }

        self.position_from_time_internal(time_point)
    }

    /// Real time at which `position` is (or was) due
    pub fn time_from_position(&self, position: TrackPosition, ignore_pause: bool) -> RealTimePoint {
        let position = if self.paused && !ignore_pause {
            self.position
        } else {
            position
        };

        if let Some(soft) = &self.soft_sync {
            if position < soft.dst_position {
                let rate = if position > soft.src_position {
                    soft.internal_rate
                } else {
                    self.playback_rate as f64
                };

                return soft.src_time_point
                    + to_real_duration(position - soft.src_position, rate);
            }
        }

        self.time_from_position_internal(position)
    }

    fn make_soft_sync_data(
        &self,
        src_time_point: RealTimePoint,
        src_position: TrackPosition,
        dst_time_point: RealTimePoint,
    ) -> Option<SoftSyncData> {
        let window = dst_time_point - src_time_point;
        if window <= RealDuration::ZERO {
            return None;
        }

        let dst_position = self.position_from_time_internal(dst_time_point);
        let internal_rate = (dst_position - src_position).get() as f64 / window.get() as f64;

        if !(internal_rate.is_finite() && internal_rate > 0.0) {
            return None;
        }

        Some(SoftSyncData {
            src_time_point,
            src_position,
            dst_time_point,
            src_pos_offset: src_position - self.position_from_time_internal(src_time_point),
            dst_position,
            internal_rate,
        })
    }

    fn position_from_time_internal(&self, time_point: RealTimePoint) -> TrackPosition {
        self.position + to_track_duration(time_point - self.time_point, self.playback_rate as f64)
    }

    fn time_from_position_internal(&self, position: TrackPosition) -> RealTimePoint {
        self.time_point + to_real_duration(position - self.position, self.playback_rate as f64)
    }

    fn scroll_time_till(&mut self, now: RealTimePoint) {
        if !self.paused {
            self.position = self.position_from_time_internal(now);

            // forget outdated corrections
            if self
                .soft_sync
                .is_some_and(|soft| soft.dst_time_point <= now)
            {
                self.soft_sync = None;
            }
        } else if let Some(soft) = &mut self.soft_sync {
            let frozen_for = now - self.time_point;
            soft.dst_time_point += frozen_for;
            soft.src_time_point += frozen_for;
        }

        self.time_point = now;
    }

    /// Offset between the corrected curve and the anchor line where the
    /// pending soft sync started, if any
    pub fn soft_sync_offset(&self) -> Option<TrackDuration> {
        self.soft_sync.map(|soft| soft.src_pos_offset)
    }
}

fn to_track_duration(duration: RealDuration, rate: f64) -> TrackDuration {
    TrackDuration::new((duration.get() as f64 * rate).round() as i64)
}

fn to_real_duration(duration: TrackDuration, rate: f64) -> RealDuration {
    RealDuration::new((duration.get() as f64 / rate).round() as i64)
}
