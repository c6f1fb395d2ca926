//! Configuration and request types for page and tile rendering.

use crate::error::{Result, ViewerError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Scale floor applied by the legacy full-page path.
pub const LEGACY_SCALE_FLOOR: f64 = 2.0;

/// Default upper bound on the pixels of one rendered canvas (64 MP).
pub const DEFAULT_MAX_CANVAS_PIXELS: u64 = 1 << 26;

/// Which page boundary box defines the page rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoxKind {
    /// Full physical page area.
    #[default]
    MediaBox,
    /// Visible (clipped) page area. Falls back to the media box when absent.
    CropBox,
}

/// How documents are identified across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdentityModel {
    /// One document at a time. Identifiers are ignored and opening a document
    /// replaces the current one.
    Single,
    /// Any number of documents, each addressed by a caller-chosen identifier.
    #[default]
    Keyed,
}

/// Scale handling for full-page rendering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScalePolicy {
    /// Requests below the floor are silently raised to it.
    Floor(f64),
    /// Any positive scale is honoured as-is.
    Unclamped,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        ScalePolicy::Floor(LEGACY_SCALE_FLOOR)
    }
}

impl ScalePolicy {
    /// Resolve a requested scale into the one actually rendered.
    pub fn resolve(&self, requested: f64) -> Result<f64> {
        if !requested.is_finite() {
            return Err(ViewerError::InvalidArgument(format!(
                "scale must be finite, got {}",
                requested
            )));
        }
        match *self {
            ScalePolicy::Floor(floor) => Ok(requested.max(floor)),
            ScalePolicy::Unclamped if requested > 0.0 => Ok(requested),
            ScalePolicy::Unclamped => Err(ViewerError::InvalidArgument(format!(
                "scale must be greater than 0, got {}",
                requested
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        if let ScalePolicy::Floor(floor) = *self {
            if !floor.is_finite() || floor <= 0.0 {
                return Err(ViewerError::InvalidConfig(
                    "scale floor must be a positive number".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Pixel format of rendered images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// PNG-encoded bytes.
    #[default]
    Png,
    /// Raw RGBA, 8 bits per channel, straight alpha, rows top to bottom.
    Rgba8,
}

/// Configuration for rasterization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Page box used for sizes and full-page rendering.
    /// Default: media box.
    pub box_kind: BoxKind,

    /// Scale policy for full-page rendering.
    /// Default: floor of 2.0.
    pub scale_policy: ScalePolicy,

    /// Output pixel format.
    /// Default: PNG.
    pub pixel_format: PixelFormat,

    /// PNG compression level (0-9, higher = smaller file, slower).
    /// Default: 1.
    pub png_compression: u8,

    /// Background color for areas not covered by the page.
    /// Default: white (255, 255, 255).
    pub background_color: (u8, u8, u8),

    /// Largest canvas, in pixels, a single render may allocate. Larger
    /// requests fail with a render failure before reaching the render thread.
    /// Default: 64 MP.
    #[serde(default = "default_max_canvas_pixels")]
    pub max_canvas_pixels: u64,
}

fn default_max_canvas_pixels() -> u64 {
    DEFAULT_MAX_CANVAS_PIXELS
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            box_kind: BoxKind::MediaBox,
            scale_policy: ScalePolicy::default(),
            pixel_format: PixelFormat::Png,
            png_compression: 1,
            background_color: (255, 255, 255),
            max_canvas_pixels: DEFAULT_MAX_CANVAS_PIXELS,
        }
    }
}

impl RenderConfig {
    /// Set the page box.
    pub fn box_kind(mut self, kind: BoxKind) -> Self {
        self.box_kind = kind;
        self
    }

    /// Set the full-page scale policy.
    pub fn scale_policy(mut self, policy: ScalePolicy) -> Self {
        self.scale_policy = policy;
        self
    }

    /// Set the output pixel format.
    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Set PNG compression level.
    pub fn png_compression(mut self, level: u8) -> Self {
        self.png_compression = level.min(9);
        self
    }

    /// Set the background color.
    pub fn background_color(mut self, color: (u8, u8, u8)) -> Self {
        self.background_color = color;
        self
    }

    /// Set the per-render canvas limit.
    pub fn max_canvas_pixels(mut self, pixels: u64) -> Self {
        self.max_canvas_pixels = pixels;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.scale_policy.validate()?;
        if self.max_canvas_pixels == 0 {
            return Err(ViewerError::InvalidConfig(
                "max_canvas_pixels must be greater than 0".to_string(),
            ));
        }
        if self.png_compression > 9 {
            return Err(ViewerError::InvalidConfig(
                "png_compression must be between 0 and 9".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where to find the pdfium shared library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdfiumConfig {
    /// Directory containing the pdfium library. If None, searches `./`,
    /// `/usr/lib`, `/usr/local/lib` and then the system library path.
    pub library_dir: Option<PathBuf>,
}

/// Combined configuration for a viewer deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Document identity model.
    pub identity: IdentityModel,

    /// Render configuration.
    pub render: RenderConfig,

    /// Pdfium binding configuration.
    pub pdfium: PdfiumConfig,
}

impl ViewerConfig {
    /// Configuration matching the single-document, media-box, clamped-scale
    /// desktop deployment.
    pub fn single_document() -> Self {
        Self {
            identity: IdentityModel::Single,
            ..Default::default()
        }
    }

    /// Configuration for keyed documents.
    pub fn keyed() -> Self {
        Self {
            identity: IdentityModel::Keyed,
            ..Default::default()
        }
    }

    /// Replace the render configuration.
    pub fn with_render(mut self, render: RenderConfig) -> Self {
        self.render = render;
        self
    }

    /// Set the pdfium library directory.
    pub fn with_pdfium_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pdfium.library_dir = Some(dir.into());
        self
    }

    /// Validate the entire configuration.
    pub fn validate(&self) -> Result<()> {
        self.render.validate()
    }
}

/// A full-page render request.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImageRequest {
    /// Document identifier. Ignored in single-document mode.
    pub document_id: Option<String>,
    /// Page number (1-indexed).
    pub page: usize,
    /// Requested scale, subject to the scale policy.
    pub scale: f64,
}

impl PageImageRequest {
    pub fn new(page: usize, scale: f64) -> Self {
        Self {
            document_id: None,
            page,
            scale,
        }
    }

    /// Address a specific document.
    pub fn for_document(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }
}

/// A tile render request.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    /// Document identifier. Ignored in single-document mode.
    pub document_id: Option<String>,
    /// Page number (1-indexed).
    pub page: usize,
    /// Zoom factor, must be greater than 0.
    pub scale: f64,
    /// Tile width in pixels.
    pub width: u32,
    /// Tile height in pixels.
    pub height: u32,
    /// Horizontal pan of the viewport centre from the page centre.
    pub x: f64,
    /// Vertical pan of the viewport centre from the page centre.
    pub y: f64,
}

impl TileRequest {
    pub fn new(page: usize, scale: f64, width: u32, height: u32) -> Self {
        Self {
            document_id: None,
            page,
            scale,
            width,
            height,
            x: 0.0,
            y: 0.0,
        }
    }

    /// Set the pan offset.
    pub fn with_offset(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Address a specific document.
    pub fn for_document(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }
}

/// A rendered page or tile.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    /// Page number (1-indexed).
    pub page_number: usize,

    /// Image width in pixels.
    pub width: u32,

    /// Image height in pixels.
    pub height: u32,

    /// Encoding of `data`.
    pub format: PixelFormat,

    /// Image bytes.
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_config_defaults() {
        let config = RenderConfig::default();
        assert_eq!(config.box_kind, BoxKind::MediaBox);
        assert_eq!(config.scale_policy, ScalePolicy::Floor(2.0));
        assert_eq!(config.pixel_format, PixelFormat::Png);
        assert_eq!(config.png_compression, 1);
        assert_eq!(config.background_color, (255, 255, 255));
        assert_eq!(config.max_canvas_pixels, DEFAULT_MAX_CANVAS_PIXELS);
    }

    #[test]
    fn test_render_config_builder_pattern() {
        let config = RenderConfig::default()
            .box_kind(BoxKind::CropBox)
            .scale_policy(ScalePolicy::Unclamped)
            .pixel_format(PixelFormat::Rgba8)
            .png_compression(9);

        assert_eq!(config.box_kind, BoxKind::CropBox);
        assert_eq!(config.scale_policy, ScalePolicy::Unclamped);
        assert_eq!(config.pixel_format, PixelFormat::Rgba8);
        assert_eq!(config.png_compression, 9);
    }

    #[test]
    fn test_render_config_png_compression_clamped() {
        let config = RenderConfig::default().png_compression(15);
        assert_eq!(config.png_compression, 9);
    }

    #[test]
    fn test_render_config_validation_bad_floor() {
        let config = RenderConfig::default().scale_policy(ScalePolicy::Floor(0.0));
        assert!(config.validate().is_err());

        let config = RenderConfig::default().scale_policy(ScalePolicy::Floor(f64::NAN));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_render_config_validation_zero_canvas_limit() {
        let config = RenderConfig::default().max_canvas_pixels(0);
        assert!(matches!(
            config.validate(),
            Err(ViewerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_scale_policy_floor_clamps_up() {
        let policy = ScalePolicy::Floor(2.0);
        assert_eq!(policy.resolve(1.0).unwrap(), 2.0);
        assert_eq!(policy.resolve(0.5).unwrap(), 2.0);
        assert_eq!(policy.resolve(3.5).unwrap(), 3.5);
    }

    #[test]
    fn test_scale_policy_unclamped() {
        let policy = ScalePolicy::Unclamped;
        assert_eq!(policy.resolve(0.25).unwrap(), 0.25);
        assert!(matches!(
            policy.resolve(0.0),
            Err(ViewerError::InvalidArgument(_))
        ));
        assert!(matches!(
            policy.resolve(-1.0),
            Err(ViewerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_scale_policy_rejects_nan() {
        assert!(ScalePolicy::Floor(2.0).resolve(f64::NAN).is_err());
        assert!(ScalePolicy::Unclamped.resolve(f64::INFINITY).is_err());
    }

    #[test]
    fn test_viewer_config_presets() {
        assert_eq!(
            ViewerConfig::single_document().identity,
            IdentityModel::Single
        );
        assert_eq!(ViewerConfig::keyed().identity, IdentityModel::Keyed);
        assert!(ViewerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_viewer_config_serde_roundtrip() {
        let config = ViewerConfig::keyed()
            .with_render(RenderConfig::default().box_kind(BoxKind::CropBox))
            .with_pdfium_dir("/opt/pdfium/lib");
        let json = serde_json::to_string(&config).unwrap();
        let back: ViewerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.render.box_kind, BoxKind::CropBox);
        assert_eq!(
            back.pdfium.library_dir,
            Some(PathBuf::from("/opt/pdfium/lib"))
        );
    }

    #[test]
    fn test_tile_request_builder() {
        let request = TileRequest::new(3, 2.0, 256, 128)
            .with_offset(-10.0, 4.5)
            .for_document("doc");
        assert_eq!(request.page, 3);
        assert_eq!(request.width, 256);
        assert_eq!(request.height, 128);
        assert_eq!(request.x, -10.0);
        assert_eq!(request.y, 4.5);
        assert_eq!(request.document_id.as_deref(), Some("doc"));
    }

    #[test]
    fn test_page_image_request_builder() {
        let request = PageImageRequest::new(1, 1.5);
        assert!(request.document_id.is_none());
        let request = request.for_document("a");
        assert_eq!(request.document_id.as_deref(), Some("a"));
    }
}
