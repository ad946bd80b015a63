//! Public traits and error types for the GBA movie container decoder.
//!
//! Mirrors the shape of the teacher's `Renderer`/`AudioOutput`/`TickError`
//! split: the decoders never touch hardware directly, they call out to
//! small sink traits that the host implements.

use thiserror::Error;

/// Width of a decoded video frame, in pixels.
pub const FRAME_WIDTH: usize = 240;
/// Height of a decoded video frame, in pixels.
pub const FRAME_HEIGHT: usize = 160;
/// Byte stride of one row of the frame buffer (2 bytes/pixel, RGB555).
pub const FRAME_STRIDE: usize = FRAME_WIDTH * 2;
/// Total size in bytes of one frame buffer.
pub const FRAME_BYTES: usize = FRAME_STRIDE * FRAME_HEIGHT;

/// Hands a freshly decoded PCM buffer to the hardware sound FIFO/DMA.
///
/// The real device double-buffers: while the sink drains one buffer, the
/// audio engine refills the other. The sink is expected to call back into
/// [`crate::audio::AudioEngine::on_buffer_consumed`] once it has finished
/// draining the buffer it was handed.
pub trait SampleSink {
    /// Submits `buffer` (interleaved per spec.md's layout for the active
    /// mode) for playback. `buffer` contains one channel's worth of signed
    /// 8-bit samples per call; mono modes call this once, stereo calls it
    /// once per channel.
    fn submit(&mut self, channel: usize, buffer: &[i8]);
}

/// Blits one decoded 240x160 RGB555 frame to the framebuffer hardware.
pub trait FrameSink {
    fn present(&mut self, frame: &[u8; FRAME_BYTES]);
}

/// Registers the two periodic host callbacks the real device wires from
/// its hardware timers: the frame-pacing vblank tick (60 Hz) and the
/// audio-buffer-consumed interrupt (`sample_rate / N` Hz). `gbam-core`
/// does not schedule anything itself; a `Ticker` implementation (owned by
/// the host, see `gbam-player`) is responsible for invoking
/// [`crate::playback::FramePacer::tick_60hz`] and
/// [`crate::audio::AudioEngine::on_buffer_consumed`] at the right rates.
pub trait Ticker {
    /// Registers the frame-pacing callback, invoked by the host at 60 Hz.
    fn register_frame_pacing(&mut self, callback: Box<dyn FnMut() + Send>);
    /// Registers the audio-buffer-consumed callback, invoked by the host
    /// whenever the sample sink finishes draining the buffer it was given.
    fn register_buffer_consumed(&mut self, callback: Box<dyn FnMut() + Send>);
}

/// Errors the audio container parser can report from `init` (§7).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AudioError {
    #[error("audio container does not start with \"GBAL\"...\"MUSI\"")]
    BadMagic,
    #[error("unsupported audio mode {0} (expected 0..=4)")]
    UnsupportedMode(u32),
    #[error("audio container is too short to contain a full header and block")]
    ShortContainer,
}

/// Errors the archive-loader collaborator can report (§6). `gbam-core`
/// never constructs these itself; they flow in from whatever implements
/// the archive lookup (see `gbam-archive`).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio container error: {0}")]
    Audio(#[from] AudioError),
}
