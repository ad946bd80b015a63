//! Playback and A/V sync engine (spec.md §4.8): decode-ahead video loop,
//! frame pacing, and the I-frame table used for minute-boundary resync.

use crate::api::{FrameSink, FRAME_BYTES};
use crate::video::VideoDecoder;

/// Frames per minute of decoded video (spec.md §4.8: "600 frames per
/// minute", i.e. a nominal 10 fps).
pub const FRAMES_PER_MINUTE: u32 = 600;

/// Upper bound on how many minute-boundary entries the I-frame table
/// tracks (spec.md §4.8).
pub const MAX_MINUTES: usize = 256;

/// Increments `target_frame` once every six 60 Hz ticks, producing a
/// nominal 10 fps release rate (spec.md §4.8 "frame pacing").
///
/// The counters are atomics rather than plain fields so a `FramePacer` can
/// be shared (via `Arc`) between the thread driving the host's 60 Hz
/// `Ticker` callback and the thread running the decode-ahead loop that
/// waits on [`FramePacer::target_frame`].
#[derive(Debug, Default)]
pub struct FramePacer {
    vblank_count: std::sync::atomic::AtomicU32,
    target_frame: std::sync::atomic::AtomicU64,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoked by the host's 60 Hz `Ticker` callback.
    pub fn tick_60hz(&self) {
        use std::sync::atomic::Ordering::Relaxed;

        let count = self.vblank_count.fetch_add(1, Relaxed) + 1;
        if count >= 6 {
            self.vblank_count.store(0, Relaxed);
            self.target_frame.fetch_add(1, Relaxed);
        }
    }

    pub fn target_frame(&self) -> u64 {
        self.target_frame.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Records the container offset of the video frame that starts each
/// minute, built by a forward scan of frame-length headers the first time
/// the driver walks the stream (spec.md §4.8 "I-frame table").
#[derive(Debug, Clone)]
pub struct IFrameTable {
    offsets: Vec<usize>,
}

impl IFrameTable {
    /// Scans `data` starting at `first_frame_offset`, recording the offset
    /// of every 600th frame (bounded to [`MAX_MINUTES`] entries).
    pub fn build(data: &[u8], first_frame_offset: usize) -> Self {
        let mut offsets = vec![first_frame_offset];
        let mut offset = first_frame_offset;
        let mut frame_count: u32 = 0;

        while offsets.len() < MAX_MINUTES {
            let Some(next) = scan_frame_len(data, offset) else { break };
            offset = next;
            frame_count += 1;
            if frame_count % FRAMES_PER_MINUTE == 0 {
                offsets.push(offset);
            }
        }

        Self { offsets }
    }

    pub fn offset_for_minute(&self, minute: u32) -> Option<usize> {
        self.offsets.get(minute as usize).copied()
    }

    pub fn total_minutes(&self) -> u32 {
        self.offsets.len() as u32
    }
}

/// Reads just enough of a frame header to compute its successor's offset,
/// without running the macroblock decoder (used only for the table scan).
fn scan_frame_len(data: &[u8], offset: usize) -> Option<usize> {
    if offset + 2 > data.len() {
        return None;
    }
    let frame_len = crate::num::read_u16_le(data, offset);
    if frame_len == 0 || frame_len == 0xFFFF {
        return None;
    }
    let next = offset + 2 + frame_len as usize;
    if next > data.len() {
        return None;
    }
    Some(next)
}

/// Drives the decode-ahead video loop described in spec.md §4.8: one frame
/// decoded into an off-screen buffer ahead of the pacing tick that releases
/// it to the `FrameSink`.
pub struct PlaybackEngine {
    decoder: VideoDecoder,
    data: Vec<u8>,
    first_frame_offset: usize,
    cursor: usize,
    off_screen: Box<[u8; FRAME_BYTES]>,
    reference: Box<[u8; FRAME_BYTES]>,
    have_reference: bool,
    current_frame: u64,
    current_minute: u32,
    iframe_table: IFrameTable,
}

impl PlaybackEngine {
    pub fn new(decoder: VideoDecoder, data: Vec<u8>, first_frame_offset: usize) -> Self {
        let iframe_table = IFrameTable::build(&data, first_frame_offset);
        Self {
            decoder,
            data,
            first_frame_offset,
            cursor: first_frame_offset,
            off_screen: Box::new([0u8; FRAME_BYTES]),
            reference: Box::new([0u8; FRAME_BYTES]),
            have_reference: false,
            current_frame: 0,
            current_minute: 0,
            iframe_table,
        }
    }

    /// One iteration of the foreground loop (spec.md §4.8 steps 1-3):
    /// decode a frame ahead, block until the pacer releases it, present it.
    pub fn run_iteration(&mut self, pacer: &FramePacer, sink: &mut dyn FrameSink) {
        self.decode_next_frame();

        while self.current_frame >= pacer.target_frame() {
            std::thread::sleep(std::time::Duration::from_micros(200));
        }

        sink.present(&self.off_screen);
        self.current_frame += 1;
        self.current_minute = (self.current_frame / u64::from(FRAMES_PER_MINUTE)) as u32;
    }

    fn decode_next_frame(&mut self) {
        let reference = if self.have_reference { Some(self.reference.as_ref()) } else { None };
        let next = self.decoder.decode_frame(&self.data, self.cursor, &mut self.off_screen, reference);

        if next == 0 {
            log::info!("video stream ended, wrapping to first frame");
            self.cursor = self.first_frame_offset;
            self.current_frame = 0;
            self.current_minute = 0;
            self.have_reference = false;
            return;
        }

        self.reference.copy_from_slice(self.off_screen.as_ref());
        self.have_reference = true;
        self.cursor = next;
    }

    /// Called after each loop iteration with the audio engine's
    /// `check_minute_sync` result: seeks the video to the matching I-frame
    /// table entry, or silently ignores an out-of-range minute
    /// (spec.md §7 `SyncMissed`).
    pub fn sync_to_minute(&mut self, minute: u32) {
        match self.iframe_table.offset_for_minute(minute) {
            Some(offset) => self.seek_to_minute(minute, offset),
            None => log::debug!("sync_minute {minute} has no I-frame table entry; ignoring"),
        }
    }

    fn seek_to_minute(&mut self, minute: u32, offset: usize) {
        self.cursor = offset;
        self.current_frame = u64::from(minute) * u64::from(FRAMES_PER_MINUTE);
        self.current_minute = minute;
        self.have_reference = false;
    }

    pub fn restart(&mut self) {
        self.seek_to_minute(0, self.first_frame_offset);
    }

    pub fn seek_next_minute(&mut self) {
        let target = self.current_minute + 1;
        if let Some(offset) = self.iframe_table.offset_for_minute(target) {
            self.seek_to_minute(target, offset);
        }
    }

    pub fn seek_previous_minute(&mut self) {
        let target = self.current_minute.saturating_sub(1);
        if let Some(offset) = self.iframe_table.offset_for_minute(target) {
            self.seek_to_minute(target, offset);
        }
    }

    pub fn current_minute(&self) -> u32 {
        self.current_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_pacer_advances_every_six_ticks() {
        let pacer = FramePacer::new();
        for _ in 0..5 {
            pacer.tick_60hz();
            assert_eq!(pacer.target_frame(), 0);
        }
        pacer.tick_60hz();
        assert_eq!(pacer.target_frame(), 1);
    }

    #[test]
    fn scenario_f_six_ticks_release_one_iteration() {
        let pacer = FramePacer::new();
        for _ in 0..6 {
            pacer.tick_60hz();
        }
        assert_eq!(pacer.target_frame(), 1);
    }

    #[test]
    fn iframe_table_records_entry_every_600_frames() {
        // Four tiny frames, each frame_len=6 (no flags/palette/payload
        // beyond the fixed 4-byte remainder of the header).
        let mut data = vec![0u8; 0];
        for _ in 0..3 {
            data.extend_from_slice(&6u16.to_le_bytes());
            data.extend_from_slice(&[0u8; 4]);
        }
        let table = IFrameTable::build(&data, 0);
        // Fewer than 600 frames recorded: only the initial entry exists.
        assert_eq!(table.total_minutes(), 1);
        assert_eq!(table.offset_for_minute(0), Some(0));
    }
}
