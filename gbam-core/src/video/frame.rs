//! Per-frame driver (spec.md §4.7): header parsing, stream cursor
//! positioning, and the 30x20 macroblock raster walk.

use crate::api::{FRAME_BYTES, FRAME_STRIDE};
use crate::num::read_u16_le;
use crate::video::bitstream::BitReader;
use crate::video::quadtree::{decode_tile, DecodeCtx, Reference, Shape};

const MACROBLOCK_COLS: usize = 30;
const MACROBLOCK_ROWS: usize = 20;
const MACROBLOCK_PX: usize = 8;

/// Decodes one frame starting at `offset` into `dst`, using `reference`
/// (or `dst` itself if `None`, for the stream's first frame). Returns the
/// offset of the next frame, or `0` if `frame_len` signals end-of-stream
/// (spec.md §7 `DecodeAborted`).
pub fn decode_frame(
    data: &[u8],
    offset: usize,
    dst: &mut [u8; FRAME_BYTES],
    reference: Option<&[u8; FRAME_BYTES]>,
    version_xor: u16,
) -> usize {
    if offset + 6 > data.len() {
        log::warn!("video frame decode: offset {offset} has no room for a frame header");
        return 0;
    }

    let frame_len = read_u16_le(data, offset);
    if frame_len == 0 || frame_len == 0xFFFF {
        log::debug!("video frame decode aborted at offset {offset}: frame_len={frame_len:#06x}");
        return 0;
    }
    let obfuscated = read_u16_le(data, offset + 2);
    let palette_bytes = read_u16_le(data, offset + 4) as usize;
    let flag_bytes = (obfuscated ^ version_xor) as usize;

    let next_offset = offset + 2 + frame_len as usize;
    let flag_start = offset + 6;
    let palette_start = flag_start + flag_bytes;
    let payload_start = palette_start + palette_bytes;

    if next_offset > data.len() || payload_start > next_offset {
        log::warn!("video frame decode: malformed stream lengths at offset {offset}");
        return 0;
    }

    let flag_data = &data[flag_start..palette_start];
    let palette = &data[palette_start..payload_start];
    let payload = &data[payload_start..next_offset];

    let mut reader = BitReader::new(0);
    let mut ctx = DecodeCtx {
        flag_data,
        reader: &mut reader,
        payload,
        payload_cursor: 0,
        palette,
        palette_cursor: 0,
        dst,
        reference: match reference {
            Some(r) => Reference::Separate(r),
            None => Reference::SameAsDest,
        },
    };

    for y in 0..MACROBLOCK_ROWS {
        for x in 0..MACROBLOCK_COLS {
            let block_offset = y * MACROBLOCK_PX * FRAME_STRIDE + x * MACROBLOCK_PX * 2;
            decode_tile(&mut ctx, Shape::S8x8, block_offset);
        }
    }

    next_offset
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each 32-bit flag word yields 31 usable bits after the sentinel;
    // 600 macroblocks x 2 bits/read needs at least 39 words (156 bytes).
    const FLAG_BYTES: u16 = 160;

    fn build_frame(version_xor: u16) -> Vec<u8> {
        // All-zero flag stream: every macroblock reads branch `00`
        // (copy-same) all the way down without subdividing.
        let mut frame = Vec::new();
        let frame_len = 4 + FLAG_BYTES;
        frame.extend_from_slice(&frame_len.to_le_bytes());
        frame.extend_from_slice(&(FLAG_BYTES ^ version_xor).to_le_bytes());
        frame.extend_from_slice(&0u16.to_le_bytes()); // palette_bytes
        frame.extend_from_slice(&vec![0u8; FLAG_BYTES as usize]);
        frame
    }

    #[test]
    fn decode_frame_with_null_reference_copies_self() {
        let frame = build_frame(0);
        let mut dst = [0u8; FRAME_BYTES];
        for (i, byte) in dst.iter_mut().enumerate() {
            *byte = (i % 241) as u8;
        }
        let before = dst;
        let next = decode_frame(&frame, 0, &mut dst, None, 0);
        assert_eq!(next, 2 + 4 + FLAG_BYTES as usize);
        assert_eq!(dst, before);
    }

    #[test]
    fn decode_frame_aborts_on_sentinel_frame_len() {
        let mut frame = vec![0u8; 6];
        frame[0..2].copy_from_slice(&0xFFFFu16.to_le_bytes());
        let mut dst = [0u8; FRAME_BYTES];
        let next = decode_frame(&frame, 0, &mut dst, None, 0);
        assert_eq!(next, 0);
    }

    #[test]
    fn decode_frame_applies_version_xor_to_recover_flag_bytes() {
        let version_xor = 0xD669;
        let frame = build_frame(version_xor);
        let mut dst = [0u8; FRAME_BYTES];
        let next = decode_frame(&frame, 0, &mut dst, None, version_xor);
        assert_eq!(next, 2 + 4 + FLAG_BYTES as usize);
    }
}
