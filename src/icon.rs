//! Fixed-size icon buffers embedded in a container.

use std::fmt;
use std::path::Path;

use crate::checksum::checksum;
use crate::color::BYTES_PER_PIXEL_565;
use crate::image::{self, bmp, Image24, ImageError, Packed565};

pub const ICON_WIDTH: u32 = 92;
pub const ICON_HEIGHT: u32 = 64;
/// Packed 5-6-5 bytes in one colour icon.
pub const ICON_BYTES: usize = ICON_WIDTH as usize * ICON_HEIGHT as usize * BYTES_PER_PIXEL_565;

pub const MONO_ICON_WIDTH: u32 = 64;
pub const MONO_ICON_HEIGHT: u32 = 24;
/// One nibble per pixel.
pub const MONO_ICON_BYTES: usize = (MONO_ICON_WIDTH * MONO_ICON_HEIGHT / 2) as usize;

/// 92x64 colour icon, big-endian 5-6-5.
#[derive(Clone, PartialEq, Eq)]
pub struct Icon(Vec<u8>);

impl Icon {
    pub fn blank() -> Self {
        Icon(vec![0u8; ICON_BYTES])
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, ImageError> {
        if data.len() != ICON_BYTES {
            return Err(ImageError::Format(format!(
                "icon data is {} bytes, expected {ICON_BYTES}",
                data.len()
            )));
        }
        Ok(Icon(data))
    }

    pub fn from_packed(packed: Packed565) -> Result<Self, ImageError> {
        check_icon_dimensions(packed.width, packed.height)?;
        Self::from_bytes(packed.data)
    }

    pub fn from_image(image: &Image24) -> Result<Self, ImageError> {
        image.check_dimensions(ICON_WIDTH, ICON_HEIGHT)?;
        Self::from_bytes(image.to_565().data)
    }

    /// Load a BMP or PNG file as an icon.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        Self::from_image(&image::load_image_file(path)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_packed(&self) -> Packed565 {
        Packed565 {
            width:  ICON_WIDTH,
            height: ICON_HEIGHT,
            data:   self.0.clone(),
        }
    }

    pub fn to_bmp(&self) -> Vec<u8> {
        bmp::encode(&self.to_packed().to_image24())
    }
}

impl Default for Icon {
    fn default() -> Self {
        Self::blank()
    }
}

impl fmt::Debug for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Icon({ICON_WIDTH}x{ICON_HEIGHT}, sum={:#010x})", checksum(&self.0))
    }
}

/// 64x24 monochrome icon, one nibble per pixel.
#[derive(Clone, PartialEq, Eq)]
pub struct MonoIcon(Vec<u8>);

impl MonoIcon {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, ImageError> {
        if data.len() != MONO_ICON_BYTES {
            return Err(ImageError::Format(format!(
                "monochrome icon data is {} bytes, expected {MONO_ICON_BYTES}",
                data.len()
            )));
        }
        Ok(MonoIcon(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MonoIcon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MonoIcon({MONO_ICON_WIDTH}x{MONO_ICON_HEIGHT}, sum={:#010x})", checksum(&self.0))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IconSet {
    pub selected:   Icon,
    pub unselected: Icon,
    pub mono:       Option<MonoIcon>,
}

fn check_icon_dimensions(width: u32, height: u32) -> Result<(), ImageError> {
    if width != ICON_WIDTH || height != ICON_HEIGHT {
        return Err(ImageError::Dimensions {
            width,
            height,
            expected_width:  ICON_WIDTH,
            expected_height: ICON_HEIGHT,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(ICON_BYTES, 0x2E00);
        assert_eq!(MONO_ICON_BYTES, 0x300);
    }

    #[test]
    fn from_image_checks_dimensions() {
        let small = Image24::new(2, 2, vec![0; 12]).unwrap();
        assert!(matches!(Icon::from_image(&small), Err(ImageError::Dimensions { width: 2, height: 2, .. })));

        let white = Image24::new(ICON_WIDTH, ICON_HEIGHT, vec![0xFF; ICON_BYTES / 2 * 3]).unwrap();
        let icon = Icon::from_image(&white).unwrap();
        assert!(icon.as_bytes().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn rejects_wrong_buffer_lengths() {
        assert!(Icon::from_bytes(vec![0; ICON_BYTES - 1]).is_err());
        assert!(MonoIcon::from_bytes(vec![0; 10]).is_err());
        assert!(Icon::from_packed(Packed565::new(1, 1, vec![0, 0]).unwrap()).is_err());
    }

    #[test]
    fn bmp_export_round_trips_pixels() {
        let mut data = vec![0u8; ICON_BYTES];
        data[0] = 0xF8; // top-left pixel pure red
        let icon = Icon::from_bytes(data).unwrap();
        let decoded = bmp::decode(&icon.to_bmp()).unwrap();
        assert_eq!(&decoded.pixels[..3], &[0, 0, 255]);
        assert_eq!(Icon::from_image(&decoded).unwrap(), icon);
    }
}
