//! PNG ingestion, restricted to 8-bit RGB.
//!
//! Decoding is delegated to the `png` crate.  The decoded `[r, g, b]`
//! samples are swapped to `[b, g, r]` so the result feeds the same packer as
//! the BMP path.

use super::{Image24, ImageError};
use crate::color::BYTES_PER_PIXEL_24;

pub fn decode(data: &[u8]) -> Result<Image24, ImageError> {
    let mut decoder = ::png::Decoder::new(data);
    decoder.set_transformations(::png::Transformations::IDENTITY);
    let mut reader = decoder.read_info().map_err(png_err)?;

    let (width, height, bit_depth, color_type) = {
        let info = reader.info();
        (info.width, info.height, info.bit_depth, info.color_type)
    };
    if bit_depth != ::png::BitDepth::Eight || color_type != ::png::ColorType::Rgb {
        return Err(ImageError::Unsupported(format!(
            "Unsupported PNG bit depth or color type ({color_type:?}, {bit_depth:?}), must be RGB-8"
        )));
    }

    let mut buf = vec![0u8; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf).map_err(png_err)?;
    buf.truncate(frame.buffer_size());

    let row_bytes = width as usize * BYTES_PER_PIXEL_24;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in buf.chunks_exact(frame.line_size).take(height as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL_24) {
        px.swap(0, 2);
    }
    Image24::new(width, height, pixels)
}

fn png_err(e: ::png::DecodingError) -> ImageError {
    match e {
        ::png::DecodingError::IoError(io) => ImageError::Io(io),
        other => ImageError::Format(other.to_string()),
    }
}
