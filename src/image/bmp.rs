//! BMP subset: 24 bpp, one plane, uncompressed, no palette.
//!
//! # Layout
//! ```text
//! 0x00  "BM"            file header (14 bytes, little-endian fields)
//! 0x02  file size   u32
//! 0x06  reserved    u16 x2
//! 0x0A  pixel offset u32
//! 0x0E  DIB header (40 bytes for BITMAPINFOHEADER)
//! ```
//! Scanlines are stored bottom-up unless the height is negative, and each
//! scanline is padded to a multiple of 4 bytes.  The 92-pixel icon width is
//! 276 bytes per row, already aligned, so icons carry no padding.

use std::io::{Cursor, Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use super::{Image24, ImageError};
use crate::color::BYTES_PER_PIXEL_24;

pub const SIGNATURE: [u8; 2] = *b"BM";
pub const FILE_HEADER_SIZE: u32 = 14;
pub const DIB_HEADER_SIZE: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub file_size:    u32,
    pub pixel_offset: u32,
}

/// BITMAPINFOHEADER.  Larger DIB variants are accepted; their extra fields
/// are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DibHeader {
    pub header_size:   u32,
    pub width:         i32,
    pub height:        i32,
    pub planes:        u16,
    pub bpp:           u16,
    pub compression:   u32,
    pub image_size:    u32,
    pub x_ppm:         i32,
    pub y_ppm:         i32,
    pub colors_used:   u32,
    pub colors_important: u32,
}

impl FileHeader {
    pub fn read<R: Read>(mut reader: R) -> Result<Self, ImageError> {
        let mut sig = [0u8; 2];
        reader.read_exact(&mut sig).map_err(|_| format_err("Strange BMP header"))?;
        if sig != SIGNATURE {
            return Err(format_err("Not a BMP file"));
        }
        let mut rest = [0u8; 12];
        reader.read_exact(&mut rest).map_err(|_| format_err("Strange BMP header"))?;
        let mut r = Cursor::new(&rest[..]);
        let file_size = r.read_u32::<LittleEndian>()?;
        let _reserved = r.read_u32::<LittleEndian>()?;
        let pixel_offset = r.read_u32::<LittleEndian>()?;
        Ok(Self { file_size, pixel_offset })
    }

    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE as usize] {
        let mut buf = [0u8; FILE_HEADER_SIZE as usize];
        buf[0..2].copy_from_slice(&SIGNATURE);
        LittleEndian::write_u32(&mut buf[2..6], self.file_size);
        LittleEndian::write_u32(&mut buf[10..14], self.pixel_offset);
        buf
    }

    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())
    }
}

impl DibHeader {
    pub fn read<R: Read>(mut reader: R) -> Result<Self, ImageError> {
        let mut raw = [0u8; DIB_HEADER_SIZE as usize];
        reader.read_exact(&mut raw).map_err(|_| format_err("Strange DIB header"))?;
        let mut r = Cursor::new(&raw[..]);
        Ok(Self {
            header_size:      r.read_u32::<LittleEndian>()?,
            width:            r.read_i32::<LittleEndian>()?,
            height:           r.read_i32::<LittleEndian>()?,
            planes:           r.read_u16::<LittleEndian>()?,
            bpp:              r.read_u16::<LittleEndian>()?,
            compression:      r.read_u32::<LittleEndian>()?,
            image_size:       r.read_u32::<LittleEndian>()?,
            x_ppm:            r.read_i32::<LittleEndian>()?,
            y_ppm:            r.read_i32::<LittleEndian>()?,
            colors_used:      r.read_u32::<LittleEndian>()?,
            colors_important: r.read_u32::<LittleEndian>()?,
        })
    }

    pub fn to_bytes(&self) -> [u8; DIB_HEADER_SIZE as usize] {
        let mut buf = [0u8; DIB_HEADER_SIZE as usize];
        LittleEndian::write_u32(&mut buf[0..4], self.header_size);
        LittleEndian::write_i32(&mut buf[4..8], self.width);
        LittleEndian::write_i32(&mut buf[8..12], self.height);
        LittleEndian::write_u16(&mut buf[12..14], self.planes);
        LittleEndian::write_u16(&mut buf[14..16], self.bpp);
        LittleEndian::write_u32(&mut buf[16..20], self.compression);
        LittleEndian::write_u32(&mut buf[20..24], self.image_size);
        LittleEndian::write_i32(&mut buf[24..28], self.x_ppm);
        LittleEndian::write_i32(&mut buf[28..32], self.y_ppm);
        LittleEndian::write_u32(&mut buf[32..36], self.colors_used);
        LittleEndian::write_u32(&mut buf[36..40], self.colors_important);
        buf
    }

    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    fn validate(&self) -> Result<(), ImageError> {
        if self.header_size < DIB_HEADER_SIZE {
            return Err(format_err("Strange DIB header"));
        }
        if self.planes != 1 {
            return Err(format_err("nplanes not 1"));
        }
        if self.bpp != 24 {
            return Err(unsupported("Unsupported color depth (must be 24 bpp)"));
        }
        if self.compression != 0 {
            return Err(unsupported("Unsupported compression"));
        }
        if self.colors_used != 0 {
            return Err(unsupported("Palette not supported"));
        }
        if self.width <= 0 || self.height == 0 || self.height == i32::MIN {
            return Err(format_err("Invalid image dimensions"));
        }
        Ok(())
    }
}

/// Bytes per stored scanline, padded to 4.
pub fn row_stride(width: u32) -> usize {
    (width as usize * BYTES_PER_PIXEL_24 + 3) & !3
}

/// Decode a whole BMP file.
pub fn decode(data: &[u8]) -> Result<Image24, ImageError> {
    let mut cursor = Cursor::new(data);
    let file_header = FileHeader::read(&mut cursor)?;
    let dib = DibHeader::read(&mut cursor)?;
    dib.validate()?;

    let width = dib.width as u32;
    let height = dib.height.unsigned_abs();
    let top_down = dib.height < 0;
    let row_bytes = width as usize * BYTES_PER_PIXEL_24;
    let stride = row_stride(width);

    let start = file_header.pixel_offset as usize;
    let needed = stride
        .checked_mul(height as usize)
        .and_then(|n| n.checked_add(start))
        .ok_or_else(|| format_err("Invalid image dimensions"))?;
    if start < (FILE_HEADER_SIZE + DIB_HEADER_SIZE) as usize || needed > data.len() {
        return Err(format_err("Unexpected EOF"));
    }

    let mut pixels = vec![0u8; row_bytes * height as usize];
    for (stored, src) in data[start..needed].chunks_exact(stride).enumerate() {
        let row = if top_down { stored } else { height as usize - 1 - stored };
        pixels[row * row_bytes..(row + 1) * row_bytes].copy_from_slice(&src[..row_bytes]);
    }
    Image24::new(width, height, pixels)
}

/// Encode an image as a bottom-up 24 bpp BMP.
pub fn encode(image: &Image24) -> Vec<u8> {
    let row_bytes = image.width as usize * BYTES_PER_PIXEL_24;
    let stride = row_stride(image.width);
    let image_size = (stride * image.height as usize) as u32;
    let pixel_offset = FILE_HEADER_SIZE + DIB_HEADER_SIZE;

    let file_header = FileHeader {
        file_size: pixel_offset + image_size,
        pixel_offset,
    };
    let dib = DibHeader {
        header_size:      DIB_HEADER_SIZE,
        width:            image.width as i32,
        height:           image.height as i32,
        planes:           1,
        bpp:              24,
        compression:      0,
        image_size,
        x_ppm:            1,
        y_ppm:            1,
        colors_used:      0,
        colors_important: 0,
    };

    let mut out = Vec::with_capacity(file_header.file_size as usize);
    out.extend_from_slice(&file_header.to_bytes());
    out.extend_from_slice(&dib.to_bytes());

    let padding = [0u8; 3];
    for row in image.pixels.chunks_exact(row_bytes.max(1)).rev() {
        out.extend_from_slice(row);
        out.extend_from_slice(&padding[..stride - row_bytes]);
    }
    out
}

fn format_err(msg: &str) -> ImageError {
    ImageError::Format(msg.to_owned())
}

fn unsupported(msg: &str) -> ImageError {
    ImageError::Unsupported(msg.to_owned())
}
