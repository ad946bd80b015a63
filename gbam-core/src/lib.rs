pub mod api;
pub mod audio;
mod num;
pub mod playback;
pub mod video;

pub use api::{AudioError, EngineError, FrameSink, SampleSink, Ticker};
pub use audio::{AudioEngine, AudioInfo, AudioMode};
pub use video::{VersionKey, VideoDecoder};
