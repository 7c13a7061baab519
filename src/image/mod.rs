//! In-memory pixel buffers and still-image ingestion.
//!
//! Two representations are in play:
//! - [`Image24`]: 3 bytes per pixel in `[b, g, r]` order, row-major, top-down.
//!   Both decoders produce this order so the packer never needs to know where
//!   the pixels came from.
//! - [`Packed565`]: 2 bytes per pixel, big-endian 5-6-5, row-major, top-down.
//!
//! [`load_image`] sniffs the first 8 bytes for the PNG signature and
//! dispatches to the PNG decoder, falling back to BMP otherwise.

pub mod bmp;
#[cfg(feature = "png")]
pub mod png;

use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::color::{bgr24_to_565, rgb565_to_bgr24, BYTES_PER_PIXEL_24, BYTES_PER_PIXEL_565};

/// The 8-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ImageError {
    /// The data is not a well-formed image of the detected kind.
    #[error("Image format error: {0}")]
    Format(String),
    /// The image is well-formed but uses a feature this decoder does not handle.
    #[error("Unsupported image: {0}")]
    Unsupported(String),
    #[error("Image dimensions {width}x{height} do not match the required {expected_width}x{expected_height}")]
    Dimensions {
        width:           u32,
        height:          u32,
        expected_width:  u32,
        expected_height: u32,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Pixel buffers ────────────────────────────────────────────────────────────

/// 24-bit image, `[b, g, r]` per pixel, top-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image24 {
    pub width:  u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Image24 {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL_24;
        if pixels.len() != expected {
            return Err(ImageError::Format(format!(
                "pixel buffer is {} bytes, expected {expected} for {width}x{height}",
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    /// Pack to big-endian 5-6-5.
    pub fn to_565(&self) -> Packed565 {
        Packed565 {
            width:  self.width,
            height: self.height,
            data:   bgr24_to_565(&self.pixels),
        }
    }

    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), ImageError> {
        if self.width != width || self.height != height {
            return Err(ImageError::Dimensions {
                width:           self.width,
                height:          self.height,
                expected_width:  width,
                expected_height: height,
            });
        }
        Ok(())
    }
}

/// 16-bit image, big-endian 5-6-5 per pixel, top-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packed565 {
    pub width:  u32,
    pub height: u32,
    pub data:   Vec<u8>,
}

impl Packed565 {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL_565;
        if data.len() != expected {
            return Err(ImageError::Format(format!(
                "packed buffer is {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Expand back to 24-bit.  Lossy round trip: see [`crate::color`].
    pub fn to_image24(&self) -> Image24 {
        Image24 {
            width:  self.width,
            height: self.height,
            pixels: rgb565_to_bgr24(&self.data),
        }
    }
}

// ── Ingestion ────────────────────────────────────────────────────────────────

/// Which decoder a buffer is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Bmp,
}

pub fn sniff(data: &[u8]) -> ImageKind {
    if data.len() >= PNG_SIGNATURE.len() && data[..PNG_SIGNATURE.len()] == PNG_SIGNATURE {
        ImageKind::Png
    } else {
        ImageKind::Bmp
    }
}

/// Decode a BMP or PNG held in memory.
pub fn load_image(data: &[u8]) -> Result<Image24, ImageError> {
    match sniff(data) {
        ImageKind::Png => decode_png(data),
        ImageKind::Bmp => bmp::decode(data),
    }
}

/// Read and decode a BMP or PNG file.
pub fn load_image_file<P: AsRef<Path>>(path: P) -> Result<Image24, ImageError> {
    let path = path.as_ref();
    let data = fs::read(path)?;
    let image = load_image(&data)?;
    tracing::debug!(path = %path.display(), width = image.width, height = image.height, "decoded image");
    Ok(image)
}

#[cfg(feature = "png")]
fn decode_png(data: &[u8]) -> Result<Image24, ImageError> {
    self::png::decode(data)
}

#[cfg(not(feature = "png"))]
fn decode_png(_: &[u8]) -> Result<Image24, ImageError> {
    Err(ImageError::Unsupported("PNG support was not compiled in".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_png_signature() {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(b"rest");
        assert_eq!(sniff(&data), ImageKind::Png);
        assert_eq!(sniff(b"BM"), ImageKind::Bmp);
        assert_eq!(sniff(&PNG_SIGNATURE[..7]), ImageKind::Bmp);
    }

    #[test]
    fn buffer_size_is_validated() {
        assert!(Image24::new(2, 2, vec![0; 12]).is_ok());
        assert!(matches!(Image24::new(2, 2, vec![0; 11]), Err(ImageError::Format(_))));
        assert!(matches!(Packed565::new(3, 1, vec![0; 5]), Err(ImageError::Format(_))));
    }

    #[test]
    fn dimension_check_reports_both_sizes() {
        let img = Image24::new(1, 2, vec![0; 6]).unwrap();
        let err = img.check_dimensions(92, 64).unwrap_err();
        assert_eq!(err.to_string(), "Image dimensions 1x2 do not match the required 92x64");
    }

    #[test]
    fn garbage_is_routed_to_bmp_and_rejected() {
        assert!(matches!(load_image(b"not an image"), Err(ImageError::Format(_))));
    }
}
