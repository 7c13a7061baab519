//! Channel depth conversion and 5-6-5 pixel packing.
//!
//! 24-bit pixels are handled as `[b, g, r]` triplets (the byte order BMP
//! stores on disk).  Packed pixels are `(r << 11) | (g << 5) | b` and always
//! stored big-endian, whatever the host byte order.

/// Bytes per 24-bit pixel.
pub const BYTES_PER_PIXEL_24: usize = 3;
/// Bytes per packed 5-6-5 pixel.
pub const BYTES_PER_PIXEL_565: usize = 2;

/// Rescale channel value `c` from `src_bits` to `dst_bits`, truncating.
///
/// `c` is taken as a fraction of `2^src_bits - 1` and multiplied by
/// `2^dst_bits - 1`.  The conversion is lossy; converting down and back up
/// can be off by up to one quantisation step.
///
/// Both depths must be in `1..=8`.
#[inline]
pub fn convert_channel_depth(c: u8, src_bits: u8, dst_bits: u8) -> u8 {
    debug_assert!((1..=8).contains(&src_bits) && (1..=8).contains(&dst_bits));
    let src_max = (1u32 << src_bits) - 1;
    let dst_max = (1u32 << dst_bits) - 1;
    let c = (c as u32).min(src_max);
    (c * dst_max / src_max) as u8
}

/// Pack one `[b, g, r]` pixel into a 5-6-5 value.
#[inline]
pub fn pack_565(bgr: [u8; 3]) -> u16 {
    let b = convert_channel_depth(bgr[0], 8, 5) as u16;
    let g = convert_channel_depth(bgr[1], 8, 6) as u16;
    let r = convert_channel_depth(bgr[2], 8, 5) as u16;
    (r << 11) | (g << 5) | b
}

/// Expand a 5-6-5 value back to a `[b, g, r]` pixel.
#[inline]
pub fn unpack_565(px: u16) -> [u8; 3] {
    let r = convert_channel_depth(((px >> 11) & 0x1F) as u8, 5, 8);
    let g = convert_channel_depth(((px >> 5) & 0x3F) as u8, 6, 8);
    let b = convert_channel_depth((px & 0x1F) as u8, 5, 8);
    [b, g, r]
}

/// Convert a buffer of `[b, g, r]` triplets to big-endian packed pixels.
pub fn bgr24_to_565(bgr: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bgr.len() / BYTES_PER_PIXEL_24 * BYTES_PER_PIXEL_565);
    for px in bgr.chunks_exact(BYTES_PER_PIXEL_24) {
        out.extend_from_slice(&pack_565([px[0], px[1], px[2]]).to_be_bytes());
    }
    out
}

/// Convert big-endian packed pixels to `[b, g, r]` triplets.
pub fn rgb565_to_bgr24(packed: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(packed.len() / BYTES_PER_PIXEL_565 * BYTES_PER_PIXEL_24);
    for px in packed.chunks_exact(BYTES_PER_PIXEL_565) {
        out.extend_from_slice(&unpack_565(u16::from_be_bytes([px[0], px[1]])));
    }
    out
}
