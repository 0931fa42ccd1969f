//! Media data handed from sources to renderers

mod frame;

pub use frame::{
    AudioPayload, Frame, FramePayload, LoopOffset, PixelFormat, TrackType, VideoPayload,
};
