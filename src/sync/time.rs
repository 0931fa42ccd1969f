//! Strongly-typed time domains
//!
//! Every position/duration carries a zero-sized tag naming its time domain, so
//! track time cannot be mixed with real-clock or container time without going
//! through one of the named conversions at the bottom of this file.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Marker for a time domain
pub trait TimeTag {
    /// Short domain name used in debug output
    const NAME: &'static str;
    /// Unit suffix used in display output
    const UNIT: &'static str;
}

/// Logical time within a track's own timeline (microseconds)
#[derive(Debug)]
pub enum TrackTime {}

/// User-facing track time (milliseconds)
#[derive(Debug)]
pub enum UserTrackTime {}

/// Container time (microseconds, includes the container start offset)
#[derive(Debug)]
pub enum ContainerTime {}

/// Stream time in native time-base ticks
#[derive(Debug)]
pub enum StreamTime {}

/// Monotonic real clock (microseconds since the clock's epoch)
#[derive(Debug)]
pub enum RealTime {}

impl TimeTag for TrackTime {
    const NAME: &'static str = "Track";
    const UNIT: &'static str = "us";
}

impl TimeTag for UserTrackTime {
    const NAME: &'static str = "UserTrack";
    const UNIT: &'static str = "ms";
}

impl TimeTag for ContainerTime {
    const NAME: &'static str = "Container";
    const UNIT: &'static str = "us";
}

impl TimeTag for StreamTime {
    const NAME: &'static str = "Stream";
    const UNIT: &'static str = "ticks";
}

impl TimeTag for RealTime {
    const NAME: &'static str = "Real";
    const UNIT: &'static str = "us";
}

/// A point on a tagged timeline
pub struct TaggedPosition<Tag> {
    value: i64,
    _tag: PhantomData<fn() -> Tag>,
}

/// A signed distance on a tagged timeline
pub struct TaggedDuration<Tag> {
    value: i64,
    _tag: PhantomData<fn() -> Tag>,
}

pub type TrackPosition = TaggedPosition<TrackTime>;
pub type TrackDuration = TaggedDuration<TrackTime>;
pub type UserTrackPosition = TaggedPosition<UserTrackTime>;
pub type UserTrackDuration = TaggedDuration<UserTrackTime>;
pub type ContainerPosition = TaggedPosition<ContainerTime>;
pub type ContainerDuration = TaggedDuration<ContainerTime>;
pub type StreamPosition = TaggedPosition<StreamTime>;
pub type StreamDuration = TaggedDuration<StreamTime>;
pub type RealTimePoint = TaggedPosition<RealTime>;
pub type RealDuration = TaggedDuration<RealTime>;

// Derives would put bounds on `Tag`, which is never instantiated.
macro_rules! impl_tagged_common {
    ($ty:ident, $kind:literal) => {
        impl<Tag> $ty<Tag> {
            pub const ZERO: Self = Self::new(0);

            #[inline]
            pub const fn new(value: i64) -> Self {
                Self {
                    value,
                    _tag: PhantomData,
                }
            }

            #[inline]
            pub const fn get(self) -> i64 {
                self.value
            }
        }

        impl<Tag> Clone for $ty<Tag> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<Tag> Copy for $ty<Tag> {}

        impl<Tag> Default for $ty<Tag> {
            fn default() -> Self {
                Self::ZERO
            }
        }

        impl<Tag> PartialEq for $ty<Tag> {
            fn eq(&self, other: &Self) -> bool {
                self.value == other.value
            }
        }

        impl<Tag> Eq for $ty<Tag> {}

        impl<Tag> PartialOrd for $ty<Tag> {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl<Tag> Ord for $ty<Tag> {
            fn cmp(&self, other: &Self) -> Ordering {
                self.value.cmp(&other.value)
            }
        }

        impl<Tag> Hash for $ty<Tag> {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.value.hash(state);
            }
        }

        impl<Tag> Neg for $ty<Tag> {
            type Output = Self;

            fn neg(self) -> Self {
                Self::new(-self.value)
            }
        }

        impl<Tag: TimeTag> fmt::Debug for $ty<Tag> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}({})", Tag::NAME, $kind, self.value)
            }
        }

        impl<Tag: TimeTag> fmt::Display for $ty<Tag> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", self.value, Tag::UNIT)
            }
        }
    };
}

impl_tagged_common!(TaggedPosition, "Position");
impl_tagged_common!(TaggedDuration, "Duration");

impl<Tag> TaggedPosition<Tag> {
    /// Distance of this position from the timeline origin
    #[inline]
    pub const fn as_duration(self) -> TaggedDuration<Tag> {
        TaggedDuration::new(self.value)
    }
}

impl<Tag> TaggedDuration<Tag> {
    /// Position at this distance from the timeline origin
    #[inline]
    pub const fn as_position(self) -> TaggedPosition<Tag> {
        TaggedPosition::new(self.value)
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.value < 0
    }

    #[inline]
    pub const fn abs(self) -> Self {
        Self::new(self.value.abs())
    }
}

impl<Tag> Add<TaggedDuration<Tag>> for TaggedPosition<Tag> {
    type Output = Self;

    fn add(self, rhs: TaggedDuration<Tag>) -> Self {
        Self::new(self.value + rhs.value)
    }
}

impl<Tag> Add<TaggedPosition<Tag>> for TaggedDuration<Tag> {
    type Output = TaggedPosition<Tag>;

    fn add(self, rhs: TaggedPosition<Tag>) -> TaggedPosition<Tag> {
        TaggedPosition::new(self.value + rhs.value)
    }
}

impl<Tag> Sub<TaggedDuration<Tag>> for TaggedPosition<Tag> {
    type Output = Self;

    fn sub(self, rhs: TaggedDuration<Tag>) -> Self {
        Self::new(self.value - rhs.value)
    }
}

impl<Tag> Sub for TaggedPosition<Tag> {
    type Output = TaggedDuration<Tag>;

    fn sub(self, rhs: Self) -> TaggedDuration<Tag> {
        TaggedDuration::new(self.value - rhs.value)
    }
}

impl<Tag> AddAssign<TaggedDuration<Tag>> for TaggedPosition<Tag> {
    fn add_assign(&mut self, rhs: TaggedDuration<Tag>) {
        self.value += rhs.value;
    }
}

impl<Tag> SubAssign<TaggedDuration<Tag>> for TaggedPosition<Tag> {
    fn sub_assign(&mut self, rhs: TaggedDuration<Tag>) {
        self.value -= rhs.value;
    }
}

impl<Tag> Add for TaggedDuration<Tag> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.value + rhs.value)
    }
}

impl<Tag> Sub for TaggedDuration<Tag> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.value - rhs.value)
    }
}

impl<Tag> AddAssign for TaggedDuration<Tag> {
    fn add_assign(&mut self, rhs: Self) {
        self.value += rhs.value;
    }
}

impl<Tag> SubAssign for TaggedDuration<Tag> {
    fn sub_assign(&mut self, rhs: Self) {
        self.value -= rhs.value;
    }
}

impl RealDuration {
    pub const fn from_micros(micros: i64) -> Self {
        Self::new(micros)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self::new(millis * 1000)
    }

    /// Convert from a std duration, saturating at `i64::MAX` microseconds
    pub fn from_std(duration: std::time::Duration) -> Self {
        Self::new(i64::try_from(duration.as_micros()).unwrap_or(i64::MAX))
    }

    /// Convert to a std duration; negative values clamp to zero
    pub fn to_std(self) -> std::time::Duration {
        std::time::Duration::from_micros(self.get().max(0) as u64)
    }
}

impl TrackDuration {
    pub const fn from_micros(micros: i64) -> Self {
        Self::new(micros)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self::new(millis * 1000)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self::new(secs * 1_000_000)
    }
}

/// Rational time base of a stream (seconds per tick = num / den)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const MICROS: TimeBase = TimeBase {
        num: 1,
        den: 1_000_000,
    };

    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Convert ticks to microseconds, `None` on a degenerate base or overflow
    pub fn ticks_to_micros(&self, ticks: i64) -> Option<i64> {
        if self.den == 0 {
            return None;
        }
        let micros = ticks as i128 * self.num as i128 * 1_000_000 / self.den as i128;
        i64::try_from(micros).ok()
    }
}

/// Track position to the user-facing millisecond domain (truncating)
pub fn to_user_position(position: TrackPosition) -> UserTrackPosition {
    UserTrackPosition::new(position.get() / 1000)
}

/// Track duration to the user-facing millisecond domain (truncating)
pub fn to_user_duration(duration: TrackDuration) -> UserTrackDuration {
    UserTrackDuration::new(duration.get() / 1000)
}

pub fn to_track_position(position: UserTrackPosition) -> TrackPosition {
    TrackPosition::new(position.get() * 1000)
}

pub fn to_track_duration(duration: UserTrackDuration) -> TrackDuration {
    TrackDuration::new(duration.get() * 1000)
}

/// Stream ticks to track duration; degenerate time bases yield zero
pub fn stream_to_track_duration(duration: StreamDuration, time_base: TimeBase) -> TrackDuration {
    TrackDuration::new(time_base.ticks_to_micros(duration.get()).unwrap_or(0))
}

/// Stream position to track position, removing the container start offset
pub fn stream_to_track_position(
    position: StreamPosition,
    time_base: TimeBase,
    start_offset: ContainerDuration,
) -> TrackPosition {
    let duration = stream_to_track_duration(position.as_duration(), time_base);
    TrackPosition::new(duration.get() - start_offset.get())
}

/// Container position to track position, removing the container start offset
pub fn container_to_track_position(
    position: ContainerPosition,
    start_offset: ContainerDuration,
) -> TrackPosition {
    TrackPosition::new((position - start_offset).get())
}

/// Track position to container position, adding the container start offset
pub fn track_to_container_position(
    position: TrackPosition,
    start_offset: ContainerDuration,
) -> ContainerPosition {
    ContainerPosition::new(position.get()) + start_offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_duration_arithmetic() {
        let start = TrackPosition::new(1_000);
        let end = TrackPosition::new(4_500);

        let span = end - start;
        assert_eq!(span, TrackDuration::new(3_500));
        assert_eq!(start + span, end);
        assert_eq!(span + start, end);
        assert_eq!(end - span, start);
        assert_eq!(-span, TrackDuration::new(-3_500));

        let mut pos = start;
        pos += TrackDuration::from_millis(2);
        pos -= TrackDuration::new(500);
        assert_eq!(pos, TrackPosition::new(2_500));
    }

    #[test]
    fn test_ordering_and_display() {
        assert!(TrackPosition::new(-1) < TrackPosition::ZERO);
        assert_eq!(
            TrackPosition::new(10).max(TrackPosition::new(7)),
            TrackPosition::new(10)
        );
        assert_eq!(TrackPosition::new(42).to_string(), "42us");
        assert_eq!(format!("{:?}", UserTrackDuration::new(3)), "UserTrackDuration(3)");
    }

    #[test]
    fn test_user_conversions() {
        let pos = TrackPosition::new(12_345_678);
        assert_eq!(to_user_position(pos), UserTrackPosition::new(12_345));
        assert_eq!(
            to_track_position(UserTrackPosition::new(12_345)),
            TrackPosition::new(12_345_000)
        );
        assert_eq!(
            to_user_duration(TrackDuration::new(999)),
            UserTrackDuration::ZERO
        );
        assert_eq!(
            to_track_duration(UserTrackDuration::new(4)),
            TrackDuration::new(4_000)
        );
    }

    #[test]
    fn test_container_conversions() {
        let offset = ContainerDuration::new(500_000);
        let container = ContainerPosition::new(2_500_000);

        let track = container_to_track_position(container, offset);
        assert_eq!(track, TrackPosition::new(2_000_000));
        assert_eq!(track_to_container_position(track, offset), container);
    }

    #[test]
    fn test_stream_conversions() {
        // 90kHz MPEG clock
        let tb = TimeBase::new(1, 90_000);
        assert_eq!(
            stream_to_track_duration(StreamDuration::new(90_000), tb),
            TrackDuration::from_secs(1)
        );
        assert_eq!(
            stream_to_track_position(
                StreamPosition::new(180_000),
                tb,
                ContainerDuration::new(1_000_000)
            ),
            TrackPosition::new(1_000_000)
        );
        assert_eq!(
            stream_to_track_duration(StreamDuration::new(5), TimeBase::new(1, 0)),
            TrackDuration::ZERO
        );
    }

    #[test]
    fn test_real_duration_std_conversion() {
        let d = RealDuration::from_std(std::time::Duration::from_millis(15));
        assert_eq!(d, RealDuration::from_micros(15_000));
        assert_eq!(d.to_std(), std::time::Duration::from_millis(15));
        assert_eq!(RealDuration::new(-10).to_std(), std::time::Duration::ZERO);
    }
}
