//! Block decompressor for compressed image resources.
//!
//! # Stream grammar
//! Each chunk starts with a control byte; its top three bits select the kind:
//!
//! | Top bits    | Encoding                         | Length          |
//! |-------------|----------------------------------|-----------------|
//! | `000`       | `000LLLLL <L+1 literal bytes>`   | `L + 1`         |
//! | `001`–`110` | `LLLaaaaa bbbbbbbb`              | `L + 3`         |
//! | `111`       | `111aaaaa LLLLLLLL bbbbbbbb`     | `L + 9`         |
//!
//! A backreference copies from `out_pos - ((a << 8 | b) + 1)`.  The source
//! range may overlap the bytes being produced, so copies run forward one
//! byte at a time.
//!
//! The output size is supplied by the caller.  Every write is bounds-checked:
//! a stream that would overrun it, reach before the start of the output, or
//! end early is rejected.
//!
//! # Resources
//! A compressed image resource is `width: u16 BE, height: u8` followed by a
//! stream that expands to `width * height` big-endian 5-6-5 pixels.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};
use thiserror::Error;

use crate::color::BYTES_PER_PIXEL_565;
use crate::image::Packed565;

/// Size of the resource prefix: width (2) + height (1).
pub const RESOURCE_HEADER_SIZE: usize = 3;

const KIND_LITERAL: u8 = 0;
const KIND_LONG: u8 = 7;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlockError {
    #[error("Compressed stream ended at offset {offset} with {missing} output bytes still expected")]
    Truncated { offset: usize, missing: usize },
    #[error("Chunk at offset {offset} writes {length} bytes but only {remaining} remain in the output")]
    Overrun { offset: usize, length: usize, remaining: usize },
    #[error("Backreference at offset {offset} reaches {distance} bytes back from output position {position}")]
    BadReference { offset: usize, distance: usize, position: usize },
    #[error("Compressed resource is shorter than its {RESOURCE_HEADER_SIZE}-byte header")]
    ShortResource,
}

/// Decompress `src` into a fresh buffer of exactly `out_len` bytes.
pub fn decompress(src: &[u8], out_len: usize) -> Result<Vec<u8>, BlockError> {
    let mut out = vec![0u8; out_len];
    decompress_into(src, &mut out)?;
    Ok(out)
}

/// Decompress `src` until `dst` is exactly full.
///
/// Returns the number of input bytes consumed.  Trailing input after the
/// output is full is left unread.
pub fn decompress_into(src: &[u8], dst: &mut [u8]) -> Result<usize, BlockError> {
    let mut ip = 0usize;
    let mut op = 0usize;
    let out_len = dst.len();

    let next = |ip: &mut usize, op: usize| -> Result<u8, BlockError> {
        let b = *src.get(*ip).ok_or(BlockError::Truncated {
            offset:  *ip,
            missing: out_len - op,
        })?;
        *ip += 1;
        Ok(b)
    };

    while op < out_len {
        let chunk_start = ip;
        let head = next(&mut ip, op)?;
        let kind = head >> 5;
        let low = (head & 0x1F) as usize;

        if kind == KIND_LITERAL {
            let len = low + 1;
            check_room(chunk_start, len, out_len - op)?;
            let lit = src.get(ip..ip + len).ok_or(BlockError::Truncated {
                offset:  src.len(),
                missing: out_len - op,
            })?;
            dst[op..op + len].copy_from_slice(lit);
            ip += len;
            op += len;
            continue;
        }

        let len = if kind == KIND_LONG {
            next(&mut ip, op)? as usize + 9
        } else {
            kind as usize + 3
        };
        let distance = ((low << 8) | next(&mut ip, op)? as usize) + 1;
        if distance > op {
            return Err(BlockError::BadReference { offset: chunk_start, distance, position: op });
        }
        check_room(chunk_start, len, out_len - op)?;

        let from = op - distance;
        for i in 0..len {
            dst[op + i] = dst[from + i];
        }
        op += len;
    }
    Ok(ip)
}

fn check_room(offset: usize, length: usize, remaining: usize) -> Result<(), BlockError> {
    if length > remaining {
        return Err(BlockError::Overrun { offset, length, remaining });
    }
    Ok(())
}

/// Header of a compressed image resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceHeader {
    pub width:  u16,
    pub height: u8,
}

impl ResourceHeader {
    pub fn read<R: Read>(mut reader: R) -> std::io::Result<Self> {
        Ok(Self {
            width:  reader.read_u16::<BigEndian>()?,
            height: reader.read_u8()?,
        })
    }

    pub fn unpacked_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL_565
    }
}

/// Unpack a compressed image resource into packed 5-6-5 pixels.
pub fn load_compressed_image(resource: &[u8]) -> Result<Packed565, BlockError> {
    let header = ResourceHeader::read(Cursor::new(resource)).map_err(|_| BlockError::ShortResource)?;
    let data = decompress(&resource[RESOURCE_HEADER_SIZE..], header.unpacked_len())?;
    tracing::debug!(width = header.width, height = header.height, "unpacked compressed image");
    Ok(Packed565 {
        width:  header.width as u32,
        height: header.height as u32,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_literal_run() {
        let src = [0x04, 10, 20, 30, 40, 50];
        let out = decompress(&src, 5).unwrap();
        assert_eq!(out, vec![10, 20, 30, 40, 50]);
        assert_eq!(decompress_into(&src, &mut [0u8; 5]).unwrap(), src.len());
    }

    #[test]
    fn overlapping_short_backref_repeats_pattern() {
        // Literal 0xAB, then a 4-byte copy from distance 1.
        let src = [0x00, 0xAB, 0x20, 0x00];
        let out = decompress(&src, 5).unwrap();
        assert_eq!(&out[1..], &[0xAB, 0xAB, 0xAB, 0xAB]);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn short_backref_with_distance() {
        // 0 1 2 3, then 4 bytes from 4 back.
        let src = [0x03, 0, 1, 2, 3, 0x20, 0x03];
        let out = decompress(&src, 8).unwrap();
        assert_eq!(out, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn longest_short_backref() {
        // Top bits 110: 6 + 3 = 9 bytes.
        let src = [0x01, 5, 6, 0xC0, 0x01];
        assert_eq!(decompress(&src, 11).unwrap(), vec![5, 6, 5, 6, 5, 6, 5, 6, 5, 6, 5]);
    }

    #[test]
    fn long_backref_takes_length_before_distance() {
        // One zero, then 0x3C + 9 = 69 more from distance 1.
        let src = [0x00, 0x00, 0xE0, 0x3C, 0x00];
        assert_eq!(decompress(&src, 70).unwrap(), vec![0u8; 70]);
    }

    #[test]
    fn stops_exactly_at_output_size() {
        let src = [0x01, 1, 2, 0x00, 9];
        assert_eq!(decompress_into(&src, &mut [0u8; 2]).unwrap(), 3);
    }

    #[test]
    fn rejects_overrun() {
        let err = decompress(&[0x04, 1, 2, 3, 4, 5], 3).unwrap_err();
        assert_eq!(err, BlockError::Overrun { offset: 0, length: 5, remaining: 3 });

        let err = decompress(&[0x00, 7, 0xE0, 0xFF, 0x00], 10).unwrap_err();
        assert!(matches!(err, BlockError::Overrun { offset: 2, .. }));
    }

    #[test]
    fn rejects_reference_before_start() {
        let err = decompress(&[0x00, 7, 0x20, 0x05], 8).unwrap_err();
        assert_eq!(err, BlockError::BadReference { offset: 2, distance: 6, position: 1 });
    }

    #[test]
    fn rejects_truncated_stream() {
        assert!(matches!(decompress(&[0x03, 1, 2], 4), Err(BlockError::Truncated { .. })));
        assert!(matches!(decompress(&[0x00, 1, 0xE0], 20), Err(BlockError::Truncated { .. })));
        assert!(matches!(decompress(&[], 1), Err(BlockError::Truncated { offset: 0, missing: 1 })));
    }

    #[test]
    fn empty_output_reads_nothing() {
        assert_eq!(decompress(&[], 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn compressed_resource() {
        // 3x1 image: one white pixel as a literal, then four copied bytes.
        let resource = [0x00, 0x03, 0x01, 0x01, 0xFF, 0xFF, 0x20, 0x00];
        let img = load_compressed_image(&resource).unwrap();
        assert_eq!((img.width, img.height), (3, 1));
        assert_eq!(img.data, vec![0xFF; 6]);
    }

    #[test]
    fn short_resource_header() {
        assert_eq!(load_compressed_image(&[0x00, 0x02]).unwrap_err(), BlockError::ShortResource);
    }
}
