//! Per-track renderers and their shared scheduling engine

mod engine;
mod subtitle;
mod video;

pub use engine::{
    frame_delay, FrameRenderer, RenderContext, Renderer, RendererEvent, RendererId,
    RendererState, RenderingResult, TrackRenderer,
};
pub use subtitle::{LogSubtitleSink, SubtitleRenderer, SubtitleSink};
pub use video::{LogVideoSink, VideoRenderer, VideoSink};
