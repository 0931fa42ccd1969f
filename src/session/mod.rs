//! Session control over a set of track renderers

mod playback;

pub use playback::{PlaybackSession, PlaybackState, SessionEvent};
