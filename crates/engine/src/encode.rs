use std::io::Write;
use std::path::Path;

use core_types::ExportFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, RgbaImage};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{EngineError, Result};

/// Serializes a composited buffer. PNG keeps the alpha channel; JPEG is
/// flattened onto white first. `quality` only affects JPEG and is clamped
/// to 1..=100.
pub fn encode(buffer: &RgbaImage, format: ExportFormat, quality: u8) -> Result<Vec<u8>> {
    let (width, height) = buffer.dimensions();
    if width == 0 || height == 0 {
        return Err(EngineError::Encode(format!(
            "cannot encode an empty {width}x{height} image as {format}"
        )));
    }

    let mut out = Vec::new();
    match format {
        ExportFormat::Png => {
            PngEncoder::new(&mut out)
                .write_image(buffer.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| EngineError::Encode(e.to_string()))?;
        }
        ExportFormat::Jpeg => {
            let flattened = flatten_onto_white(buffer);
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            encoder
                .encode_image(&flattened)
                .map_err(|e| EngineError::Encode(e.to_string()))?;
        }
    }
    debug!(%format, width, height, bytes = out.len(), "encoded image");
    Ok(out)
}

/// `dst = src * a + white * (1 - a)` per channel.
pub fn flatten_onto_white(buffer: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(buffer.width(), buffer.height(), |x, y| {
        let [r, g, b, a] = buffer.get_pixel(x, y).0;
        let alpha = f32::from(a) / 255.0;
        let mix = |c: u8| (f32::from(c) * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        Rgb([mix(r), mix(g), mix(b)])
    })
}

/// Writes through a temporary file in the destination directory and renames
/// it into place, so a failed export never leaves a truncated file behind.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| EngineError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::tempdir;

    #[test]
    fn png_preserves_alpha_verbatim() {
        let mut img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 0]));
        img.put_pixel(1, 1, Rgba([200, 100, 50, 77]));
        let bytes = encode(&img, ExportFormat::Png, 0).unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn jpeg_flattens_transparent_pixels_to_white() {
        let mut img = RgbaImage::from_pixel(16, 16, Rgba([255, 0, 0, 255]));
        for y in 0..8 {
            for x in 0..16 {
                img.put_pixel(x, y, Rgba([255, 0, 0, 0]));
            }
        }
        let bytes = encode(&img, ExportFormat::Jpeg, 95).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();

        let top = decoded.get_pixel(8, 2);
        assert!(top.0.iter().all(|&c| c > 240), "expected white, got {top:?}");
        let bottom = decoded.get_pixel(8, 13);
        assert!(bottom[0] > 200 && bottom[1] < 60 && bottom[2] < 60, "{bottom:?}");
    }

    #[test]
    fn flatten_mixes_partial_alpha_with_white() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let flat = flatten_onto_white(&img);
        assert_eq!(flat.get_pixel(0, 0), &Rgb([127, 127, 127]));
    }

    #[test]
    fn jpeg_quality_zero_still_encodes() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([0, 128, 255, 255]));
        let bytes = encode(&img, ExportFormat::Jpeg, 0).unwrap();
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[test]
    fn empty_buffer_is_an_encode_error() {
        let img = RgbaImage::new(0, 5);
        assert!(matches!(
            encode(&img, ExportFormat::Png, 90),
            Err(EngineError::Encode(_))
        ));
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.png");
        std::fs::write(&target, b"old").unwrap();

        write_atomic(&target, b"new contents").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"new contents");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
