use core_types::ConfigError;
use image::{ImageReader, Limits, RgbaImage};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod compositor;
pub mod encode;
pub mod export;
pub mod font;
pub mod naming;
pub mod placement;
pub mod preview;

pub use compositor::{Compositor, PreparedWatermark};
pub use encode::{encode, write_atomic};
pub use export::{export_batch, CancellationFlag, ExportOptions, ExportProgress, ExportReport};
pub use font::{CoverageMode, FontFamily, FontRegistry, SystemFontRegistry};
pub use naming::build_name;
pub use placement::resolve_position;
pub use preview::{PreviewScheduler, PreviewTicket};

/// Longest accepted side of a decoded source, caps worst-case render time.
pub const MAX_SOURCE_DIMENSION: u32 = 16_384;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error for {origin}: {message}")]
    Decode { origin: String, message: String },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Watermark of {width}x{height} px exceeds the layer limit")]
    WatermarkTooLarge { width: u64, height: u64 },

    #[error("Refusing to overwrite source image {}", .0.display())]
    WouldOverwriteSource(PathBuf),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub(crate) fn decode(origin: impl fmt::Display, err: impl fmt::Display) -> Self {
        EngineError::Decode {
            origin: origin.to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    Path(PathBuf),
    Buffer(String),
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOrigin::Path(path) => write!(f, "{}", path.display()),
            SourceOrigin::Buffer(label) => f.write_str(label),
        }
    }
}

/// A decoded original. Pixels are shared read-only; the compositor always
/// draws into its own copy, so the same source can be rendered any number
/// of times without watermarks stacking up.
#[derive(Debug, Clone)]
pub struct SourceImage {
    origin: SourceOrigin,
    pixels: Arc<RgbaImage>,
}

impl SourceImage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = ImageReader::open(path)?
            .with_guessed_format()
            .map_err(|e| EngineError::decode(path.display(), e))?;
        let pixels = decode_limited(reader, &path.display())?;
        Ok(Self {
            origin: SourceOrigin::Path(path.to_path_buf()),
            pixels: Arc::new(pixels),
        })
    }

    pub fn from_bytes(label: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let label = label.into();
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| EngineError::decode(&label, e))?;
        let pixels = decode_limited(reader, &label)?;
        Ok(Self {
            origin: SourceOrigin::Buffer(label),
            pixels: Arc::new(pixels),
        })
    }

    pub fn from_rgba(origin: SourceOrigin, pixels: RgbaImage) -> Self {
        Self {
            origin,
            pixels: Arc::new(pixels),
        }
    }

    pub fn origin(&self) -> &SourceOrigin {
        &self.origin
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

pub(crate) fn decode_limited<R>(mut reader: ImageReader<R>, origin: &dyn fmt::Display) -> Result<RgbaImage>
where
    R: std::io::BufRead + std::io::Seek,
{
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);
    reader.limits(limits);
    let decoded = reader
        .decode()
        .map_err(|e| EngineError::decode(origin, e))?;
    Ok(decoded.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::tempdir;

    #[test]
    fn open_decodes_to_rgba() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("src.png");
        RgbaImage::from_pixel(8, 4, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let source = SourceImage::open(&path).expect("open");
        assert_eq!((source.width(), source.height()), (8, 4));
        assert_eq!(source.pixels().get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
        assert_eq!(source.origin(), &SourceOrigin::Path(path));
    }

    #[test]
    fn corrupt_bytes_are_a_decode_error() {
        let err = SourceImage::from_bytes("garbage", b"definitely not an image").unwrap_err();
        assert!(matches!(err, EngineError::Decode { .. }), "{err}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let err = SourceImage::open(dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn clones_share_pixels_read_only() {
        let source = SourceImage::from_rgba(
            SourceOrigin::Buffer("mem".into()),
            RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])),
        );
        let copy = source.clone();
        assert!(std::ptr::eq(source.pixels(), copy.pixels()));
    }
}
