//! Recursive quadtree tile decoder (spec.md §4.6): each of the 15 tile
//! shapes a macroblock can subdivide into shares one decode function,
//! branching on two flag bits read MSB-first from the frame's flag stream.

use crate::num::read_u16_le;
use crate::video::bitstream::BitReader;
use crate::video::codebook::CODEBOOK;
use crate::video::ops;

const ROW_STRIDE: i32 = 480;

/// One of the 15 tile shapes a macroblock recursively subdivides into.
/// Named `WxH` (width-by-height, in pixels), matching spec.md §3's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    S8x8,
    S4x8,
    S8x4,
    S4x4,
    S2x8,
    S8x2,
    S2x4,
    S4x2,
    S1x8,
    S8x1,
    S2x2,
    S1x4,
    S4x1,
    S1x2,
    S2x1,
}

impl Shape {
    /// `(width, height)` in pixels.
    fn dims(self) -> (usize, usize) {
        match self {
            Shape::S8x8 => (8, 8),
            Shape::S4x8 => (4, 8),
            Shape::S8x4 => (8, 4),
            Shape::S4x4 => (4, 4),
            Shape::S2x8 => (2, 8),
            Shape::S8x2 => (8, 2),
            Shape::S2x4 => (2, 4),
            Shape::S4x2 => (4, 2),
            Shape::S1x8 => (1, 8),
            Shape::S8x1 => (8, 1),
            Shape::S2x2 => (2, 2),
            Shape::S1x4 => (1, 4),
            Shape::S4x1 => (4, 1),
            Shape::S1x2 => (1, 2),
            Shape::S2x1 => (2, 1),
        }
    }
}

/// Where a tile's unchanged/referenced pixels come from.
pub enum Reference<'a> {
    /// A separate previous-frame buffer.
    Separate(&'a [u8]),
    /// The destination buffer itself (first frame of a stream, spec.md
    /// §4.7): codebook offsets are guaranteed to address already-written
    /// pixels.
    SameAsDest,
}

/// Everything one recursive decode call needs: the flag bitstream, the
/// palette/payload cursors, and the destination/reference frame buffers.
pub struct DecodeCtx<'a, 'r> {
    pub flag_data: &'a [u8],
    pub reader: &'a mut BitReader,
    pub payload: &'a [u8],
    pub payload_cursor: usize,
    pub palette: &'a [u8],
    pub palette_cursor: usize,
    pub dst: &'a mut [u8],
    pub reference: Reference<'r>,
}

impl<'a, 'r> DecodeCtx<'a, 'r> {
    fn next_payload_byte(&mut self) -> u8 {
        let byte = self.payload[self.payload_cursor];
        self.payload_cursor += 1;
        byte
    }

    fn next_palette_color(&mut self) -> u16 {
        let color = read_u16_le(self.palette, self.palette_cursor);
        self.palette_cursor += 2;
        color
    }

    fn copy(&mut self, dst_off: usize, ref_off: usize, rows: usize, cols: usize) {
        match self.reference {
            Reference::Separate(reference) => ops::copy(self.dst, reference, dst_off, ref_off, rows, cols),
            Reference::SameAsDest => ops::copy_within(self.dst, dst_off, ref_off, rows, cols),
        }
    }

    fn delta(&mut self, dst_off: usize, ref_off: usize, rows: usize, cols: usize, delta: u16) {
        match self.reference {
            Reference::Separate(reference) => {
                ops::delta(self.dst, reference, dst_off, ref_off, rows, cols, delta)
            }
            Reference::SameAsDest => ops::delta_within(self.dst, dst_off, ref_off, rows, cols, delta),
        }
    }

    fn write_pixel(&mut self, offset: usize, color: u16) {
        let bytes = color.to_le_bytes();
        self.dst[offset] = bytes[0];
        self.dst[offset + 1] = bytes[1];
    }
}

/// Decodes one tile of `shape` at byte offset `block_offset` within the
/// frame buffer, consuming bits/bytes from the three streams as needed.
pub fn decode_tile(ctx: &mut DecodeCtx, shape: Shape, block_offset: usize) {
    match shape {
        Shape::S1x2 | Shape::S2x1 => decode_atomic_leaf(ctx, shape, block_offset),
        _ => decode_generic(ctx, shape, block_offset),
    }
}

fn decode_generic(ctx: &mut DecodeCtx, shape: Shape, block_offset: usize) {
    let (width, height) = shape.dims();
    match ctx.reader.next_two_bits(ctx.flag_data) {
        0b00 => {
            // copy-same: degenerate/no-op when reference aliases dst.
            if !matches!(ctx.reference, Reference::SameAsDest) {
                ctx.copy(block_offset, block_offset, height, width);
            }
        }
        0b01 => {
            let index = ctx.next_payload_byte();
            let ref_off = apply_codebook(block_offset, index);
            ctx.copy(block_offset, ref_off, height, width);
        }
        0b10 => match one_way_split(shape) {
            Some((child, advance)) => {
                decode_tile(ctx, child, block_offset);
                decode_tile(ctx, child, block_offset + advance);
            }
            None => {
                let (child0, advance0, child1, advance1) = two_way_split(shape);
                let (child, advance) = if ctx.reader.next_bit(ctx.flag_data) == 0 {
                    (child0, advance0)
                } else {
                    (child1, advance1)
                };
                decode_tile(ctx, child, block_offset);
                decode_tile(ctx, child, block_offset + advance);
            }
        },
        _ => {
            if ctx.reader.next_bit(ctx.flag_data) == 0 {
                let index = ctx.next_payload_byte();
                let ref_off = apply_codebook(block_offset, index);
                let delta = ctx.next_palette_color();
                ctx.delta(block_offset, ref_off, height, width, delta);
            } else {
                let color = ctx.next_palette_color();
                ops::fill(ctx.dst, block_offset, height, width, color);
            }
        }
    }
}

/// The 1x2/2x1 leaves never subdivide; branches `10` and `11` are
/// reassigned (spec.md §4.6).
fn decode_atomic_leaf(ctx: &mut DecodeCtx, shape: Shape, block_offset: usize) {
    let (width, height) = shape.dims();
    match ctx.reader.next_two_bits(ctx.flag_data) {
        0b00 => {
            if !matches!(ctx.reference, Reference::SameAsDest) {
                ctx.copy(block_offset, block_offset, height, width);
            }
        }
        0b01 => {
            let index = ctx.next_payload_byte();
            let ref_off = apply_codebook(block_offset, index);
            ctx.copy(block_offset, ref_off, height, width);
        }
        0b10 => {
            let index = ctx.next_payload_byte();
            let ref_off = apply_codebook(block_offset, index);
            let delta = ctx.next_palette_color();
            ctx.delta(block_offset, ref_off, height, width, delta);
        }
        _ => {
            if ctx.reader.next_bit(ctx.flag_data) == 0 {
                let color = ctx.next_palette_color();
                ops::fill(ctx.dst, block_offset, height, width, color);
            } else {
                let (first_off, second_off) = match shape {
                    Shape::S1x2 => (block_offset, block_offset + ROW_STRIDE as usize),
                    Shape::S2x1 => (block_offset, block_offset + 2),
                    _ => unreachable!("decode_atomic_leaf only called for 1x2/2x1"),
                };
                let color_a = ctx.next_palette_color();
                let color_b = ctx.next_palette_color();
                ctx.write_pixel(first_off, color_a);
                ctx.write_pixel(second_off, color_b);
            }
        }
    }
}

fn apply_codebook(block_offset: usize, index: u8) -> usize {
    (block_offset as i64 + CODEBOOK[index as usize] as i64) as usize
}

/// Two-way subdivision (spec.md §4.6 table): returns
/// `(split0_child, split0_advance, split1_child, split1_advance)`. Split 0
/// halves height (tiles stacked vertically); split 1 halves width (tiles
/// side by side).
fn two_way_split(shape: Shape) -> (Shape, usize, Shape, usize) {
    match shape {
        Shape::S8x8 => (Shape::S8x4, 4 * ROW_STRIDE as usize, Shape::S4x8, 4 * 2),
        Shape::S8x4 => (Shape::S8x2, 2 * ROW_STRIDE as usize, Shape::S4x4, 4 * 2),
        Shape::S4x8 => (Shape::S4x4, 4 * ROW_STRIDE as usize, Shape::S2x8, 2 * 2),
        Shape::S2x8 => (Shape::S2x4, 4 * ROW_STRIDE as usize, Shape::S1x8, 1 * 2),
        Shape::S4x4 => (Shape::S4x2, 2 * ROW_STRIDE as usize, Shape::S2x4, 2 * 2),
        Shape::S8x2 => (Shape::S8x1, 1 * ROW_STRIDE as usize, Shape::S4x2, 4 * 2),
        Shape::S2x4 => (Shape::S2x2, 2 * ROW_STRIDE as usize, Shape::S1x4, 1 * 2),
        Shape::S4x2 => (Shape::S4x1, 1 * ROW_STRIDE as usize, Shape::S2x2, 2 * 2),
        Shape::S2x2 => (Shape::S2x1, 1 * ROW_STRIDE as usize, Shape::S1x2, 1 * 2),
        other => unreachable!("{other:?} is not a two-way-subdividable shape"),
    }
}

/// Shapes that admit only one split direction (spec.md §4.6): the extra
/// direction bit is not read. Returns `(child_shape, advance)`.
fn one_way_split(shape: Shape) -> Option<(Shape, usize)> {
    match shape {
        Shape::S8x1 => Some((Shape::S4x1, 4 * 2)),
        Shape::S4x1 => Some((Shape::S2x1, 2 * 2)),
        Shape::S1x8 => Some((Shape::S1x4, 4 * ROW_STRIDE as usize)),
        Shape::S1x4 => Some((Shape::S1x2, 2 * ROW_STRIDE as usize)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FRAME_BYTES;

    fn flag_word(bits: u32) -> Vec<u8> {
        bits.to_le_bytes().to_vec()
    }

    #[test]
    fn scenario_c_all_copy_same_leaves_frame_unchanged() {
        // spec.md §8 scenario C: flag word all zero, 600 macroblocks all
        // decode as copy-same against a separate reference; dst must end
        // up equal to reference.
        let flag_data = flag_word(0);
        let mut reference = vec![0u8; FRAME_BYTES];
        for (i, byte) in reference.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        let mut dst = vec![0u8; FRAME_BYTES];
        let mut reader = BitReader::new(0);
        let payload = [0u8; 0];
        let palette = [0u8; 0];
        let mut ctx = DecodeCtx {
            flag_data: &flag_data,
            reader: &mut reader,
            payload: &payload,
            payload_cursor: 0,
            palette: &palette,
            palette_cursor: 0,
            dst: &mut dst,
            reference: Reference::Separate(&reference),
        };
        decode_tile(&mut ctx, Shape::S8x8, 0);
        assert_eq!(&dst[0..16], &reference[0..16]);
    }

    #[test]
    fn subdivide_restores_block_offset_for_sibling() {
        // Invariant 3 (spec.md §8): decoding 8x8 as two 8x4 halves via
        // split-bit 0 must cover exactly the 8x8 footprint, landing the
        // second half at +4 rows (1920 bytes) with no drift.
        // flags: 10 (subdivide), 0 (split0 dir), 00 (copy-same), 00 (copy-same)
        let bits: u32 = 0b10_0_00_00 << (32 - 7);
        let flag_data = flag_word(bits);
        let reference = vec![0u8; FRAME_BYTES];
        let mut dst = vec![0u8; FRAME_BYTES];
        let mut reader = BitReader::new(0);
        let payload = [0u8; 0];
        let palette = [0u8; 0];
        let mut ctx = DecodeCtx {
            flag_data: &flag_data,
            reader: &mut reader,
            payload: &payload,
            payload_cursor: 0,
            palette: &palette,
            palette_cursor: 0,
            dst: &mut dst,
            reference: Reference::Separate(&reference),
        };
        decode_tile(&mut ctx, Shape::S8x8, 0);
        // Both 8x4 halves decoded as copy-same against an all-zero
        // reference; nothing in the macroblock's footprint should differ.
        assert!(dst[0..8 * 480].iter().all(|&b| b == 0));
    }

    #[test]
    fn scenario_d_fill_writes_palette_color_over_whole_tile() {
        // spec.md §8 scenario D: branch 11 with inner bit 0 is a single-color
        // fill over the whole tile.
        let bits: u32 = 0b11_0 << (32 - 3);
        let flag_data = flag_word(bits);
        let reference = vec![0u8; FRAME_BYTES];
        let mut dst = vec![0u8; FRAME_BYTES];
        let mut reader = BitReader::new(0);
        let payload = [0u8; 0];
        let palette = 0x1234u16.to_le_bytes();
        let mut ctx = DecodeCtx {
            flag_data: &flag_data,
            reader: &mut reader,
            payload: &payload,
            payload_cursor: 0,
            palette: &palette,
            palette_cursor: 0,
            dst: &mut dst,
            reference: Reference::Separate(&reference),
        };
        decode_tile(&mut ctx, Shape::S8x8, 0);
        assert_eq!(read_u16_le(&dst, 0), 0x1234);
        assert_eq!(read_u16_le(&dst, 7 * 480 + 7 * 2), 0x1234);
    }

    #[test]
    fn copy_offset_reads_codebook_indexed_tile() {
        let bits: u32 = 0b01 << (32 - 2);
        let flag_data = flag_word(bits);
        let mut reference = vec![0u8; FRAME_BYTES];
        ops::fill(&mut reference, 0, 8, 8, 0xABCD);
        let mut dst = vec![0u8; FRAME_BYTES];
        let mut reader = BitReader::new(0);
        let payload = [136u8]; // codebook index 136 -> zero displacement
        let palette = [0u8; 0];
        let mut ctx = DecodeCtx {
            flag_data: &flag_data,
            reader: &mut reader,
            payload: &payload,
            payload_cursor: 0,
            palette: &palette,
            palette_cursor: 0,
            dst: &mut dst,
            reference: Reference::Separate(&reference),
        };
        decode_tile(&mut ctx, Shape::S8x8, 0);
        assert_eq!(read_u16_le(&dst, 0), 0xABCD);
    }
}
