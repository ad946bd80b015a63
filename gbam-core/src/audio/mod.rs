//! Audio engine: container parsing, double-buffered decode, and the public
//! playback control surface (spec.md §4.3, §4.9, §6).

mod adpcm;
mod block;
mod container;

pub use container::{AudioHeader, AudioMode};

use crate::api::{AudioError, SampleSink};
use block::BlockCursor;

/// Swap granularity: the number of samples per channel decoded ahead of
/// playback into each of the two buffers (spec.md §4.3 "N is typically 1024
/// at 22050 Hz, giving roughly a 21 Hz swap rate; must be a multiple of 8
/// so every mode's sub-byte group divides it evenly").
pub const PCM_BUFFER_SAMPLES: usize = 1024;

/// One of the two alternating decode-ahead buffers.
#[derive(Debug, Clone)]
struct PcmBuffer {
    channels: [[i8; PCM_BUFFER_SAMPLES]; 2],
}

impl Default for PcmBuffer {
    fn default() -> Self {
        Self { channels: [[0; PCM_BUFFER_SAMPLES]; 2] }
    }
}

/// Playback lifecycle state (spec.md §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackState {
    Ready,
    Playing,
    Paused,
    Finished,
}

/// Summary information about an initialized audio stream (spec.md §6).
#[derive(Debug, Clone, Copy)]
pub struct AudioInfo {
    pub mode: AudioMode,
    pub sample_rate: u32,
    pub channels: usize,
    pub total_minutes: u32,
}

/// Decodes a `.gbs` audio container and drives double-buffered playback
/// through a host-supplied [`SampleSink`].
///
/// Owns a private copy of the container bytes: unlike the steady-state PCM
/// buffers, which never allocate, loading a container is a one-time setup
/// step and an owned `Vec` keeps the engine's lifetime independent of the
/// archive loader that produced the bytes.
pub struct AudioEngine {
    container: Vec<u8>,
    header: AudioHeader,
    cursor: BlockCursor,
    buffers: [PcmBuffer; 2],
    active_buffer: usize,
    state: PlaybackState,
    samples_per_minute: u64,
    samples_decoded: u64,
    total_minutes: u32,
    last_minute_seen: u32,
    sync_minute: Option<u32>,
}

impl AudioEngine {
    /// Parses the container header and prepares the first two decode-ahead
    /// buffers (spec.md §6 `init`).
    pub fn init(container: Vec<u8>) -> Result<Self, AudioError> {
        let header = AudioHeader::parse(&container)?;
        let mode = header.mode;
        let mut cursor = BlockCursor::new(mode, &container);

        let samples_per_minute = u64::from(mode.sample_rate()) * 60;
        let total_samples = cursor.total_blocks() as u64 * mode.samples_per_block() as u64;
        let total_minutes = ((total_samples + samples_per_minute - 1) / samples_per_minute.max(1))
            .max(1) as u32;

        let mut buffers = [PcmBuffer::default(), PcmBuffer::default()];
        fill_buffer(&mut cursor, &container, mode, &mut buffers[0]);

        log::info!(
            "audio engine initialized: {:?}, {} total blocks, ~{} minutes",
            mode,
            cursor.total_blocks(),
            total_minutes
        );

        Ok(Self {
            container,
            header,
            cursor,
            buffers,
            active_buffer: 0,
            state: PlaybackState::Ready,
            samples_per_minute,
            samples_decoded: 0,
            total_minutes,
            last_minute_seen: 0,
            sync_minute: None,
        })
    }

    pub fn info(&self) -> AudioInfo {
        AudioInfo {
            mode: self.header.mode,
            sample_rate: self.header.mode.sample_rate(),
            channels: self.header.mode.channels(),
            total_minutes: self.total_minutes,
        }
    }

    /// Submits the active buffer to `sink` and transitions to `Playing`
    /// (spec.md §6 `start`).
    pub fn start(&mut self, sink: &mut dyn SampleSink) {
        self.state = PlaybackState::Playing;
        self.submit_active(sink);
    }

    pub fn stop(&mut self) {
        self.state = PlaybackState::Ready;
        self.cursor.reset_to_block(&self.container, 0);
        self.samples_decoded = 0;
        self.active_buffer = 0;
        self.last_minute_seen = 0;
        self.sync_minute = None;
        fill_buffer(&mut self.cursor, &self.container, self.header.mode, &mut self.buffers[0]);
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Playing;
        }
    }

    pub fn restart(&mut self, sink: &mut dyn SampleSink) {
        self.stop();
        self.start(sink);
    }

    /// Seeks to the first block at or after `minute`'s sample offset,
    /// clearing sub-byte buffered state (spec.md §4.3, §6 `seek_minute`).
    pub fn seek_minute(&mut self, minute: u32, sink: &mut dyn SampleSink) {
        // If at or past the end, wrap to 0 (spec.md §4.3).
        let minute = if minute >= self.total_minutes { 0 } else { minute };
        let target_sample = u64::from(minute) * self.samples_per_minute;
        let block_samples = self.header.mode.samples_per_block() as u64;
        let block_index = (target_sample / block_samples.max(1)) as usize;

        self.cursor.reset_to_block(&self.container, block_index);
        self.samples_decoded = target_sample;
        self.active_buffer = 0;
        self.last_minute_seen = minute;
        self.sync_minute = None;
        fill_buffer(&mut self.cursor, &self.container, self.header.mode, &mut self.buffers[0]);
        if self.state == PlaybackState::Playing {
            self.submit_active(sink);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn is_finished(&self) -> bool {
        self.state == PlaybackState::Finished
    }

    pub fn progress_percent(&self) -> f32 {
        let total = (self.total_minutes as u64 * self.samples_per_minute).max(1);
        (self.samples_decoded.min(total) as f32 / total as f32) * 100.0
    }

    pub fn current_minute(&self) -> u32 {
        (self.samples_decoded / self.samples_per_minute.max(1)) as u32
    }

    pub fn total_minutes(&self) -> u32 {
        self.total_minutes
    }

    /// Called by the host when the sink finishes draining the buffer it was
    /// handed: decodes the next buffer in the background slot, swaps, and
    /// resubmits (spec.md §4.3 "double buffering").
    pub fn on_buffer_consumed(&mut self, sink: &mut dyn SampleSink) {
        if self.state != PlaybackState::Playing {
            return;
        }
        if self.cursor.is_finished() {
            self.state = PlaybackState::Finished;
            return;
        }

        let next = 1 - self.active_buffer;
        let mode = self.header.mode;
        let decoded = fill_buffer(&mut self.cursor, &self.container, mode, &mut self.buffers[next]);
        self.samples_decoded += decoded as u64;
        self.active_buffer = next;
        self.submit_active(sink);

        let minute = self.current_minute();
        if minute != self.last_minute_seen {
            self.last_minute_seen = minute;
            self.sync_minute = Some(minute);
        }

        if self.cursor.is_finished() {
            log::debug!("audio stream reached end of container");
        }
    }

    /// Checks whether playback has just crossed a minute boundary, for the
    /// player to resync against the video clock (spec.md §4.8, §9). Returns
    /// the crossed-into minute once, then `None` until the next crossing.
    pub fn check_minute_sync(&mut self) -> Option<u32> {
        self.sync_minute.take()
    }

    pub fn shutdown(self) {
        log::info!("audio engine shut down at minute {}", self.current_minute());
    }

    fn submit_active(&self, sink: &mut dyn SampleSink) {
        let buffer = &self.buffers[self.active_buffer];
        sink.submit(0, &buffer.channels[0]);
        if self.header.mode.channels() == 2 {
            sink.submit(1, &buffer.channels[1]);
        }
    }
}

fn fill_buffer(cursor: &mut BlockCursor, container: &[u8], mode: AudioMode, buffer: &mut PcmBuffer) -> usize {
    let (left, right) = buffer.channels.split_at_mut(1);
    if mode.channels() == 2 {
        cursor.fill(container, &mut left[0], Some(&mut right[0]))
    } else {
        cursor.fill(container, &mut left[0], None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        calls: Vec<(usize, usize)>,
    }

    impl SampleSink for RecordingSink {
        fn submit(&mut self, channel: usize, buffer: &[i8]) {
            self.calls.push((channel, buffer.len()));
        }
    }

    fn make_container(mode_selector: u32, extra_blocks: usize) -> Vec<u8> {
        let mode = AudioMode::from_selector(mode_selector).unwrap();
        let mut bytes = vec![0u8; container::HEADER_LEN + mode.block_size() * extra_blocks.max(1)];
        bytes[0x000..0x004].copy_from_slice(b"GBAL");
        let len = bytes.len() as u32;
        bytes[0x004..0x008].copy_from_slice(&len.to_le_bytes());
        bytes[0x008..0x00C].copy_from_slice(b"MUSI");
        bytes[0x010..0x014].copy_from_slice(&mode_selector.to_le_bytes());
        bytes
    }

    #[test]
    fn init_parses_header_and_fills_first_buffer() {
        let bytes = make_container(0, 4);
        let engine = AudioEngine::init(bytes).unwrap();
        assert_eq!(engine.info().channels, 2);
        assert_eq!(engine.info().sample_rate, 22050);
    }

    #[test]
    fn start_submits_both_channels_for_stereo() {
        let bytes = make_container(0, 4);
        let mut engine = AudioEngine::init(bytes).unwrap();
        let mut sink = RecordingSink { calls: Vec::new() };
        engine.start(&mut sink);
        assert_eq!(sink.calls, vec![(0, PCM_BUFFER_SAMPLES), (1, PCM_BUFFER_SAMPLES)]);
    }

    #[test]
    fn start_submits_single_channel_for_mono() {
        let bytes = make_container(2, 4);
        let mut engine = AudioEngine::init(bytes).unwrap();
        let mut sink = RecordingSink { calls: Vec::new() };
        engine.start(&mut sink);
        assert_eq!(sink.calls, vec![(0, PCM_BUFFER_SAMPLES)]);
    }

    #[test]
    fn buffer_consumed_eventually_finishes_short_stream() {
        let bytes = make_container(4, 2);
        let mut engine = AudioEngine::init(bytes).unwrap();
        let mut sink = RecordingSink { calls: Vec::new() };
        engine.start(&mut sink);
        for _ in 0..1000 {
            if engine.is_finished() {
                break;
            }
            engine.on_buffer_consumed(&mut sink);
        }
        assert!(engine.is_finished());
    }

    #[test]
    fn stop_resets_progress_to_zero() {
        let bytes = make_container(2, 8);
        let mut engine = AudioEngine::init(bytes).unwrap();
        let mut sink = RecordingSink { calls: Vec::new() };
        engine.start(&mut sink);
        engine.on_buffer_consumed(&mut sink);
        assert!(engine.samples_decoded > 0);
        engine.stop();
        assert_eq!(engine.progress_percent(), 0.0);
        assert!(!engine.is_playing());
    }

    #[test]
    fn pause_resume_round_trips_state() {
        let bytes = make_container(0, 4);
        let mut engine = AudioEngine::init(bytes).unwrap();
        let mut sink = RecordingSink { calls: Vec::new() };
        engine.start(&mut sink);
        engine.pause();
        assert!(engine.is_paused());
        engine.resume();
        assert!(engine.is_playing());
    }

    #[test]
    fn seek_minute_past_end_wraps_to_zero() {
        let bytes = make_container(2, 8);
        let mut engine = AudioEngine::init(bytes).unwrap();
        let mut sink = RecordingSink { calls: Vec::new() };
        engine.start(&mut sink);
        engine.seek_minute(engine.total_minutes() + 5, &mut sink);
        assert_eq!(engine.current_minute(), 0);
    }

    #[test]
    fn no_spurious_sync_immediately_after_start() {
        let bytes = make_container(0, 4);
        let mut engine = AudioEngine::init(bytes).unwrap();
        let mut sink = RecordingSink { calls: Vec::new() };
        engine.start(&mut sink);
        assert_eq!(engine.check_minute_sync(), None);
    }

    #[test]
    fn seek_minute_zero_matches_restart_sync_state() {
        let bytes = make_container(2, 8);
        let mut seeked = AudioEngine::init(bytes.clone()).unwrap();
        let mut sink = RecordingSink { calls: Vec::new() };
        seeked.start(&mut sink);
        seeked.on_buffer_consumed(&mut sink);
        seeked.seek_minute(0, &mut sink);

        let mut restarted = AudioEngine::init(bytes).unwrap();
        restarted.start(&mut sink);
        restarted.on_buffer_consumed(&mut sink);
        restarted.restart(&mut sink);

        assert_eq!(seeked.check_minute_sync(), restarted.check_minute_sync());
        assert_eq!(seeked.current_minute(), restarted.current_minute());
    }
}
