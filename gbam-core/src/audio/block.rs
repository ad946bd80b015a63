//! Audio block engine (spec.md §4.2): per-block header re-seeding, cursor
//! advance, and the four body-unpacking schemes (1 byte -> 1 stereo pair,
//! 3 bytes -> 8 codes, 1 byte -> 2 codes, 1 byte -> 4 codes).

use crate::audio::adpcm::{decode_code2, decode_code3, decode_ima4, ChannelState};
use crate::audio::container::{AudioMode, HEADER_LEN};
use crate::num::read_u16_le;

/// Small FIFO of already-decoded samples waiting to be emitted, used for
/// every mode that packs more than one sample per input byte/group (spec.md
/// §4.2, §9 "Sub-byte sample buffering"). Capacity 8 covers the worst case
/// (mode 1's 8-sample group).
#[derive(Debug, Clone, Copy, Default)]
struct PendingQueue {
    samples: [i8; 8],
    head: u8,
    len: u8,
}

impl PendingQueue {
    fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    fn push_group(&mut self, samples: &[i8]) {
        debug_assert!(samples.len() <= self.samples.len());
        self.samples[..samples.len()].copy_from_slice(samples);
        self.head = 0;
        self.len = samples.len() as u8;
    }

    fn pop(&mut self) -> Option<i8> {
        if self.len == 0 {
            return None;
        }
        let sample = self.samples[self.head as usize];
        self.head += 1;
        self.len -= 1;
        Some(sample)
    }
}

/// Per-channel-group decode cursor: arithmetic ADPCM state plus the
/// container-relative position of the block currently being consumed.
#[derive(Debug, Clone)]
pub struct BlockCursor {
    mode: AudioMode,
    total_blocks: usize,
    block_index: usize,
    byte_in_block: usize,
    left: ChannelState,
    right: ChannelState,
    pending_left: PendingQueue,
    pending_right: PendingQueue,
    is_finished: bool,
}

impl BlockCursor {
    pub fn new(mode: AudioMode, container: &[u8]) -> Self {
        let body_len = mode.block_size();
        let total_blocks = (container.len().saturating_sub(HEADER_LEN)) / body_len;
        let mut cursor = Self {
            mode,
            total_blocks,
            block_index: 0,
            byte_in_block: 0,
            left: ChannelState::default(),
            right: ChannelState::default(),
            pending_left: PendingQueue::default(),
            pending_right: PendingQueue::default(),
            is_finished: total_blocks == 0,
        };
        if !cursor.is_finished {
            cursor.parse_header(container);
        }
        cursor
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    pub fn block_index(&self) -> usize {
        self.block_index
    }

    pub fn is_finished(&self) -> bool {
        self.is_finished
    }

    fn block_start(&self) -> usize {
        HEADER_LEN + self.block_index * self.mode.block_size()
    }

    fn body_len(&self) -> usize {
        self.mode.block_size() - self.mode.block_header_len()
    }

    /// Clears sub-byte buffered state. Called on seek/restart (spec.md §4.2
    /// invariant); ordinary block-to-block advance never needs it because
    /// every mode's body length divides evenly into that mode's group size.
    pub fn clear_pending(&mut self) {
        self.pending_left.clear();
        self.pending_right.clear();
    }

    /// Re-seeds arithmetic state from the block header at the cursor's
    /// current `block_index` (spec.md §3 "Block header").
    fn parse_header(&mut self, container: &[u8]) {
        let offset = self.block_start();
        match self.mode {
            AudioMode::StereoIma4 => {
                let pred_l = read_u16_le(container, offset) as i16 as i32;
                let step_l = i32::from(read_u16_le(container, offset + 2)).clamp(0, 88);
                let pred_r = read_u16_le(container, offset + 4) as i16 as i32;
                let step_r = i32::from(read_u16_le(container, offset + 6)).clamp(0, 88);
                self.left = ChannelState::new(pred_l, step_l);
                self.right = ChannelState::new(pred_r, step_r);
            }
            AudioMode::Mono4Bit => {
                let raw_pred = i32::from(read_u16_le(container, offset));
                let step = i32::from(read_u16_le(container, offset + 2)).clamp(0, 88);
                self.left = ChannelState::new(raw_pred - 0x8000, step);
            }
            AudioMode::Mono3Bit => {
                let raw_pred = i32::from(read_u16_le(container, offset));
                let step = i32::from(read_u16_le(container, offset + 2)).clamp(0, 88);
                self.left = ChannelState::new(raw_pred, step);
            }
            AudioMode::Mono2Bit | AudioMode::Mono2BitSmall => {
                let raw_pred = i32::from(read_u16_le(container, offset));
                let step = i32::from(read_u16_le(container, offset + 2)).clamp(0, 0x160);
                self.left = ChannelState::new(raw_pred, step);
            }
        }
        log::debug!(
            "audio block {}/{} header re-seeded (left predictor={})",
            self.block_index,
            self.total_blocks,
            self.left.predictor
        );
    }

    /// Advances to the next block, re-seeding state, or marks the cursor
    /// finished once all blocks have been consumed (spec.md §4.2).
    fn advance_block(&mut self, container: &[u8]) {
        self.block_index += 1;
        self.byte_in_block = 0;
        if self.block_index >= self.total_blocks {
            self.is_finished = true;
            return;
        }
        self.parse_header(container);
    }

    /// Ensures at least `needed` body bytes remain in the current block,
    /// advancing to the next block first if not. Returns `false` if the
    /// stream has finished.
    fn ensure_bytes_available(&mut self, container: &[u8], needed: usize) -> bool {
        if self.is_finished {
            return false;
        }
        if self.byte_in_block + needed > self.body_len() {
            self.advance_block(container);
            if self.is_finished {
                return false;
            }
        }
        true
    }

    fn next_body_byte(&mut self, container: &[u8]) -> u8 {
        let byte = container[self.block_start() + self.mode.block_header_len() + self.byte_in_block];
        self.byte_in_block += 1;
        byte
    }

    /// Refills `out_left` (and `out_right` for stereo) with up to
    /// `out_left.len()` freshly decoded samples, advancing the cursor
    /// through blocks as needed, and returns how many of those samples were
    /// actually decoded (as opposed to zero-padded). Once the stream
    /// finishes mid-buffer, remaining output is padded with zero and
    /// excluded from the returned count (spec.md §4.2, §8 testable
    /// property 5).
    pub fn fill(&mut self, container: &[u8], out_left: &mut [i8], out_right: Option<&mut [i8]>) -> usize {
        let mut decoded = 0;
        match self.mode {
            AudioMode::StereoIma4 => {
                let out_right = out_right.expect("stereo mode requires a right channel buffer");
                for i in 0..out_left.len() {
                    if !self.ensure_bytes_available(container, 1) {
                        out_left[i] = 0;
                        out_right[i] = 0;
                        continue;
                    }
                    let byte = self.next_body_byte(container);
                    out_left[i] = (decode_ima4(byte & 0x0F, &mut self.left) >> 8) as i8;
                    out_right[i] = (decode_ima4(byte >> 4, &mut self.right) >> 8) as i8;
                    decoded += 1;
                }
            }
            AudioMode::Mono4Bit => {
                for sample in out_left.iter_mut() {
                    if let Some(pending) = self.pending_left.pop() {
                        *sample = pending;
                        decoded += 1;
                        continue;
                    }
                    if !self.ensure_bytes_available(container, 1) {
                        *sample = 0;
                        continue;
                    }
                    let byte = self.next_body_byte(container);
                    let low = (decode_ima4(byte & 0x0F, &mut self.left) >> 8) as i8;
                    let high = (decode_ima4(byte >> 4, &mut self.left) >> 8) as i8;
                    self.pending_left.push_group(&[high]);
                    *sample = low;
                    decoded += 1;
                }
            }
            AudioMode::Mono2Bit | AudioMode::Mono2BitSmall => {
                for sample in out_left.iter_mut() {
                    if let Some(pending) = self.pending_left.pop() {
                        *sample = pending;
                        decoded += 1;
                        continue;
                    }
                    if !self.ensure_bytes_available(container, 1) {
                        *sample = 0;
                        continue;
                    }
                    let byte = self.next_body_byte(container);
                    let codes = [byte & 0x3, (byte >> 2) & 0x3, (byte >> 4) & 0x3, (byte >> 6) & 0x3];
                    let decoded_codes: Vec<i8> = codes
                        .iter()
                        .map(|&code| (decode_code2(code, &mut self.left) >> 8) as i8)
                        .collect();
                    self.pending_left.push_group(&decoded_codes[1..]);
                    *sample = decoded_codes[0];
                    decoded += 1;
                }
            }
            AudioMode::Mono3Bit => {
                for sample in out_left.iter_mut() {
                    if let Some(pending) = self.pending_left.pop() {
                        *sample = pending;
                        decoded += 1;
                        continue;
                    }
                    if !self.ensure_bytes_available(container, 3) {
                        *sample = 0;
                        continue;
                    }
                    let b0 = self.next_body_byte(container);
                    let b1 = self.next_body_byte(container);
                    let b2 = self.next_body_byte(container);
                    let group = u32::from(b0) | (u32::from(b1) << 8) | (u32::from(b2) << 16);
                    let decoded_codes: Vec<i8> = (0..8)
                        .map(|i| {
                            let code = ((group >> (3 * i)) & 0x7) as u8;
                            (decode_code3(code, &mut self.left) >> 8) as i8
                        })
                        .collect();
                    self.pending_left.push_group(&decoded_codes[1..]);
                    *sample = decoded_codes[0];
                    decoded += 1;
                }
            }
        }
        decoded
    }

    /// Resets the cursor to block 0 and re-seeds its header, clearing
    /// sub-byte buffers (restart / seek, spec.md §4.3).
    pub fn reset_to_block(&mut self, container: &[u8], block_index: usize) {
        self.block_index = block_index.min(self.total_blocks.saturating_sub(1));
        self.byte_in_block = 0;
        self.is_finished = self.total_blocks == 0;
        self.clear_pending();
        if !self.is_finished {
            self.parse_header(container);
        }
    }
}
