//! Content fingerprints for frame deduplication.
//!
//! A [`FrameSignature`] is a fixed-size summary of a frame: per-channel
//! 64-bit sums, a packed-word XOR, and an FNV-1a-64 rolling hash. Equal
//! signatures are necessary but not sufficient for equal frames, so
//! [`frames_identical`] confirms with a byte compare only after the
//! signatures match. The cheap path (signature mismatch) is the common
//! one on any scene with motion.

use crate::image::RawImage;

const FNV64_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0001_0000_01b3;

/// Fingerprint of one frame. Immutable once computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameSignature {
    pub width: u32,
    pub height: u32,
    pub sum_b: u64,
    pub sum_g: u64,
    pub sum_r: u64,
    pub sum_a: u64,
    pub xor32: u32,
    pub fnv1a64: u64,
}

impl FrameSignature {
    /// Compute the signature of a BGRA8 image in a single pass.
    pub fn of(img: &RawImage) -> Self {
        let mut sig = Self {
            width: img.width(),
            height: img.height(),
            ..Self::default()
        };
        if !img.ok() {
            return sig;
        }

        let mut fnv = FNV64_OFFSET_BASIS;
        for px in img.as_bgra_bytes().chunks_exact(4) {
            sig.sum_b += u64::from(px[0]);
            sig.sum_g += u64::from(px[1]);
            sig.sum_r += u64::from(px[2]);
            sig.sum_a += u64::from(px[3]);
            sig.xor32 ^= u32::from_le_bytes([px[0], px[1], px[2], px[3]]);
            for &byte in px {
                fnv ^= u64::from(byte);
                fnv = fnv.wrapping_mul(FNV64_PRIME);
            }
        }
        sig.fnv1a64 = fnv;
        sig
    }
}

/// All-field signature comparison: the fast rejection test.
pub fn signature_equal(a: &FrameSignature, b: &FrameSignature) -> bool {
    a == b
}

/// Exact frame equality: signature filter first, byte compare second.
/// Invalid images never compare identical.
pub fn frames_identical(
    a: &RawImage,
    b: &RawImage,
    sig_a: &FrameSignature,
    sig_b: &FrameSignature,
) -> bool {
    if !a.ok() || !b.ok() {
        return false;
    }
    if !signature_equal(sig_a, sig_b) {
        return false;
    }
    a.bytes_equal(b)
}
