//! Image codec producing cropped derivatives.
//!
//! # Design Decisions
//!
//! - **Never upscale**: the master's dimensions are read from its header first.
//!   A master smaller than the requested box in either dimension fails with
//!   [`CodecError::SourceTooSmall`] and nothing is written.
//!
//! - **Hard crop**: with `crop = true` the master is scaled to cover the box
//!   and center-cropped to exactly `width x height`.
//!
//! - **Same format as the master**: the derivative keeps the master's format
//!   and extension.
//!
//! - **Atomic store**: the encoded bytes are written next to the master via
//!   [`write_atomic`], so a half-written derivative is never visible.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::error::CodecError;
use crate::io::write_atomic;

/// Default JPEG quality for derivatives (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 82;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Capability that resizes a master into a derivative stored next to it.
///
/// Implementations are synchronous and CPU-bound; callers run them on a
/// blocking thread.
pub trait ImageCodec: Send + Sync {
    /// Resize `source` to `width x height` and store the result in the same
    /// directory.
    ///
    /// Returns the file name (not the full path) of the stored derivative.
    fn resize(&self, source: &Path, width: u32, height: u32, crop: bool)
        -> Result<String, CodecError>;

    /// The same strategy, storing outputs under editor `editor_id`'s names.
    ///
    /// Used when no codec is bound to an editor id. `None` means the codec
    /// cannot name outputs per editor and the request is refused.
    fn editor_variant(&self, _editor_id: &str) -> Option<Arc<dyn ImageCodec>> {
        None
    }
}

/// Parse a resampling filter name.
///
/// Accepts `nearest`, `triangle`, `catmullrom`, `gaussian` and `lanczos3`.
pub fn parse_filter(name: &str) -> Option<FilterType> {
    match name.to_ascii_lowercase().as_str() {
        "nearest" => Some(FilterType::Nearest),
        "triangle" | "bilinear" => Some(FilterType::Triangle),
        "catmullrom" | "bicubic" => Some(FilterType::CatmullRom),
        "gaussian" => Some(FilterType::Gaussian),
        "lanczos3" | "lanczos" => Some(FilterType::Lanczos3),
        _ => None,
    }
}

/// [`ImageCodec`] backed by the `image` crate.
///
/// # Example
///
/// ```ignore
/// use thumb_streamer::thumbnail::{ImageCodec, ImageCrateCodec};
///
/// let codec = ImageCrateCodec::new();
/// let name = codec.resize(Path::new("/srv/uploads/photos/sunset.jpg"), 150, 150, true)?;
/// assert_eq!(name, "sunset-150x150.jpg");
/// ```
#[derive(Debug, Clone)]
pub struct ImageCrateCodec {
    filter: FilterType,
    jpeg_quality: u8,
    editor_marker: Option<String>,
}

impl Default for ImageCrateCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCrateCodec {
    /// Lanczos3 resampling at the default JPEG quality.
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            editor_marker: None,
        }
    }

    /// Use a different resampling filter.
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Set the JPEG quality, clamped to 1-100.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY);
        self
    }

    /// Name outputs `<stem>-e<id>-<W>x<H>.<ext>` so derivatives of an
    /// editor are stored under the same name they are requested by.
    pub fn for_editor(mut self, editor_id: impl Into<String>) -> Self {
        self.editor_marker = Some(editor_id.into());
        self
    }

    pub fn filter(&self) -> FilterType {
        self.filter
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// File name of the derivative of `source` at `width x height`.
    pub fn output_name(&self, source: &Path, width: u32, height: u32) -> Option<String> {
        let stem = source.file_stem()?.to_str()?;
        let extension = source.extension()?.to_str()?;

        let marker = self
            .editor_marker
            .as_ref()
            .map(|id| format!("-e{}", id))
            .unwrap_or_default();

        Some(format!("{stem}{marker}-{width}x{height}.{extension}"))
    }

    fn encode(&self, image: DynamicImage, format: ImageFormat) -> Result<Vec<u8>, CodecError> {
        let mut output = Cursor::new(Vec::new());

        match format {
            ImageFormat::Jpeg => {
                let image = if image.color().has_alpha() {
                    DynamicImage::ImageRgb8(image.to_rgb8())
                } else {
                    image
                };
                let mut encoder = JpegEncoder::new_with_quality(&mut output, self.jpeg_quality);
                encoder
                    .encode_image(&image)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
            ImageFormat::Png => {
                image
                    .write_to(&mut output, format)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
            ImageFormat::Gif | ImageFormat::WebP => {
                DynamicImage::ImageRgba8(image.to_rgba8())
                    .write_to(&mut output, format)
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
            }
            other => {
                return Err(CodecError::UnsupportedFormat(format!("{:?}", other)));
            }
        }

        Ok(output.into_inner())
    }
}

impl ImageCodec for ImageCrateCodec {
    fn resize(
        &self,
        source: &Path,
        width: u32,
        height: u32,
        crop: bool,
    ) -> Result<String, CodecError> {
        let format = ImageFormat::from_path(source)
            .map_err(|e| CodecError::UnsupportedFormat(e.to_string()))?;

        let (source_width, source_height) =
            image::image_dimensions(source).map_err(|e| CodecError::Decode(e.to_string()))?;

        if source_width < width || source_height < height {
            return Err(CodecError::SourceTooSmall {
                source_width,
                source_height,
                width,
                height,
            });
        }

        let name = self.output_name(source, width, height).ok_or_else(|| {
            CodecError::Storage(format!("cannot name derivative of {}", source.display()))
        })?;

        let master = image::open(source).map_err(|e| CodecError::Decode(e.to_string()))?;
        let resized = if crop {
            master.resize_to_fill(width, height, self.filter)
        } else {
            master.resize(width, height, self.filter)
        };

        let bytes = self.encode(resized, format)?;
        let destination = source.with_file_name(&name);
        write_atomic(&destination, &bytes).map_err(|e| CodecError::Storage(e.to_string()))?;

        debug!(
            source = %source.display(),
            derivative = %destination.display(),
            width,
            height,
            bytes = bytes.len(),
            "Stored derivative"
        );

        Ok(name)
    }

    fn editor_variant(&self, editor_id: &str) -> Option<Arc<dyn ImageCodec>> {
        Some(Arc::new(self.clone().for_editor(editor_id)))
    }
}
