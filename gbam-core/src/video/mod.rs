//! Video decoder: container-version key handling and the public
//! `decode_frame`/`set_version_key` surface (spec.md §6, §9).

mod bitstream;
mod codebook;
mod frame;
mod ops;
mod quadtree;

use crate::api::FRAME_BYTES;

/// Which container generation's obfuscation constant to XOR against the
/// per-frame bit-encoding word (spec.md §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKey {
    Gen1,
    Gen3,
    V130,
}

impl VersionKey {
    pub fn xor_constant(self) -> u16 {
        match self {
            VersionKey::Gen1 => 0xD669,
            VersionKey::Gen3 => 0xD6AC,
            VersionKey::V130 => 0x0000,
        }
    }
}

/// Stateless (apart from the version key) frame decoder: all other state —
/// the destination/reference buffers, the I-frame table, playback
/// position — lives in `crate::playback`.
pub struct VideoDecoder {
    version_key: VersionKey,
}

impl VideoDecoder {
    pub fn new(version_key: VersionKey) -> Self {
        Self { version_key }
    }

    pub fn set_version_key(&mut self, version_key: VersionKey) {
        self.version_key = version_key;
    }

    /// Decodes one frame at `offset` into `dst`, returning the next frame's
    /// offset (or `0` on end-of-stream/invalid, spec.md §7).
    pub fn decode_frame(
        &self,
        data: &[u8],
        offset: usize,
        dst: &mut [u8; FRAME_BYTES],
        reference: Option<&[u8; FRAME_BYTES]>,
    ) -> usize {
        frame::decode_frame(data, offset, dst, reference, self.version_key.xor_constant())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_key_constants_match_spec() {
        assert_eq!(VersionKey::Gen1.xor_constant(), 0xD669);
        assert_eq!(VersionKey::Gen3.xor_constant(), 0xD6AC);
        assert_eq!(VersionKey::V130.xor_constant(), 0x0000);
    }

    #[test]
    fn decode_frame_delegates_to_frame_module() {
        let decoder = VideoDecoder::new(VersionKey::V130);
        let mut frame_bytes = Vec::new();
        frame_bytes.extend_from_slice(&0xFFFFu16.to_le_bytes());
        let mut dst = [0u8; FRAME_BYTES];
        assert_eq!(decoder.decode_frame(&frame_bytes, 0, &mut dst, None), 0);
    }
}
