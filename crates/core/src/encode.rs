//! Turning rendered canvases into output bytes.

use crate::config::PixelFormat;
use crate::error::{Result, ViewerError};
use image::RgbaImage;
use std::io::Cursor;

/// Map a 0-9 compression level onto the png crate's presets.
fn png_compression(level: u8) -> png::Compression {
    match level {
        0..=2 => png::Compression::Fast,
        3..=6 => png::Compression::Default,
        _ => png::Compression::Best,
    }
}

/// Encode an RGBA image to PNG bytes.
pub fn encode_png(image: &RgbaImage, compression: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    let mut encoder = png::Encoder::new(&mut buffer, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png_compression(compression));

    let mut writer = encoder.write_header().map_err(|e| {
        ViewerError::PngEncodingError(format!("Failed to write PNG header: {}", e))
    })?;

    writer.write_image_data(image.as_raw()).map_err(|e| {
        ViewerError::PngEncodingError(format!("Failed to write PNG data: {}", e))
    })?;

    drop(writer);

    Ok(buffer.into_inner())
}

/// Encode an image in the requested pixel format.
///
/// `Rgba8` hands back the canvas bytes untouched: 4 bytes per pixel, straight
/// alpha, rows top to bottom.
pub fn encode_image(image: RgbaImage, format: PixelFormat, compression: u8) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Png => encode_png(&image, compression),
        PixelFormat::Rgba8 => Ok(image.into_raw()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_encode_png_small_image() {
        let image = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let png_data = encode_png(&image, 1).unwrap();
        assert!(png_data.len() > 8);
        assert_eq!(&png_data[0..8], &PNG_MAGIC);
    }

    #[test]
    fn test_encode_png_decodes_back() {
        let mut image = RgbaImage::new(3, 2);
        image.put_pixel(2, 1, Rgba([10, 20, 30, 255]));
        let png_data = encode_png(&image, 9).unwrap();

        let decoded = image::load_from_memory(&png_data).unwrap().into_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_encode_raw_rgba() {
        let image = RgbaImage::from_pixel(2, 3, Rgba([1, 2, 3, 255]));
        let raw = encode_image(image, PixelFormat::Rgba8, 1).unwrap();
        assert_eq!(raw.len(), 2 * 3 * 4);
        assert_eq!(&raw[0..4], &[1, 2, 3, 255]);
    }

    #[test]
    fn test_compression_levels() {
        assert!(matches!(png_compression(0), png::Compression::Fast));
        assert!(matches!(png_compression(5), png::Compression::Default));
        assert!(matches!(png_compression(9), png::Compression::Best));
    }
}
