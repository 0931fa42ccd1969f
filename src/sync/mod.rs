//! Time domains, clocks, and the real-time/track-time mapping

pub mod clock;
mod controller;
pub mod time;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use controller::{PlaybackRate, TimeController, DEFAULT_FIXING_TIME};
pub use time::{RealDuration, RealTimePoint, TrackDuration, TrackPosition};
