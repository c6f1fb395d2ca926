//! Raster plans for full pages and tiles.
//!
//! A plan is the destination buffer size plus the transform from PDF user
//! space to destination pixels that a backend paints the page through.
//!
//! Tiles use one addressing convention: the destination buffer is centred on
//! the page centre at one pixel per page-space unit, and the transform is
//! anchored at the buffer's top edge with a negative y scale, the same as the
//! full-page path. A tile whose offset differs from its neighbour's by exactly
//! the tile size is therefore the neighbour shifted by a whole number of
//! pixels: `x + width` is the tile to the right, `y + height` the tile below.

use crate::config::{BoxKind, RenderConfig, ScalePolicy};
use crate::error::{Result, ViewerError};
use crate::geometry::{
    drawing_transform, upright_transform, PageGeometry, Rect, Rotation, Size, Transform,
};
use image::Rgba;

/// Fill for pixels the page does not cover.
pub const OPAQUE_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Plan for rendering a whole page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterPlan {
    /// Exact output size, `box size * scale`.
    pub output_size: Size,
    /// User space to destination pixels.
    pub transform: Transform,
    pub fill: Rgba<u8>,
}

impl RasterPlan {
    /// Pixel width of the destination buffer.
    pub fn width_px(&self) -> u32 {
        pixels(self.output_size.width)
    }

    /// Pixel height of the destination buffer.
    pub fn height_px(&self) -> u32 {
        pixels(self.output_size.height)
    }
}

/// Plan for rendering one tile of a zoomed page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRasterPlan {
    pub dest_width: u32,
    pub dest_height: u32,
    /// The zoomed and panned page rectangle in page space (y up).
    pub source_bounds: Rect,
    pub fill: Rgba<u8>,
    /// User space to destination pixels.
    pub transform: Transform,
}

fn pixels(extent: f64) -> u32 {
    // truncation matches the pixel sizing of the platform renderers
    (extent as u32).max(1)
}

/// Pure page geometry calculations, configured per deployment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometryEngine {
    box_kind: BoxKind,
    scale_policy: ScalePolicy,
    fill: Rgba<u8>,
}

impl Default for PageGeometryEngine {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

impl PageGeometryEngine {
    pub fn new(config: &RenderConfig) -> Self {
        let (r, g, b) = config.background_color;
        Self {
            box_kind: config.box_kind,
            scale_policy: config.scale_policy,
            fill: Rgba([r, g, b, 255]),
        }
    }

    pub fn box_kind(&self) -> BoxKind {
        self.box_kind
    }

    pub fn scale_policy(&self) -> ScalePolicy {
        self.scale_policy
    }

    /// Page size for layout, width and height swapped for 90°/270° pages.
    pub fn effective_size(&self, page: &PageGeometry) -> Size {
        page.effective_size(self.box_kind)
    }

    /// Plan a full-page render at `scale`, after applying the scale policy.
    pub fn full_page_plan(&self, page: &PageGeometry, scale: f64) -> Result<RasterPlan> {
        let scale = self.scale_policy.resolve(scale)?;
        let page_box = page.box_rect(self.box_kind);
        let output_size = page_box.size().scaled(scale);

        let drawing = drawing_transform(
            &page_box,
            page.rotation,
            &Rect::new(0.0, 0.0, page_box.width, page_box.height),
            Rotation::None,
            true,
        );
        let transform = drawing
            .then(&Transform::scale(scale, -scale))
            .then(&Transform::translate(0.0, output_size.height));

        Ok(RasterPlan {
            output_size,
            transform,
            fill: self.fill,
        })
    }

    /// Plan a render that stretches the displayed page over exactly
    /// `width x height` pixels.
    pub fn stretched_page_plan(
        &self,
        page: &PageGeometry,
        width: u32,
        height: u32,
    ) -> Result<RasterPlan> {
        check_dimensions(width, height)?;
        let page_box = page.box_rect(self.box_kind);
        let effective = self.effective_size(page);
        let (w, h) = (width as f64, height as f64);

        let transform = upright_transform(&page_box, page.rotation)
            .then(&Transform::scale(w / effective.width, -h / effective.height))
            .then(&Transform::translate(0.0, h));

        Ok(RasterPlan {
            output_size: Size::new(w, h),
            transform,
            fill: self.fill,
        })
    }

    /// Plan one tile of the page zoomed by `scale` and panned by
    /// `(offset_x, offset_y)` from the page centre.
    pub fn tile_plan(
        &self,
        page: &PageGeometry,
        scale: f64,
        width: u32,
        height: u32,
        offset_x: f64,
        offset_y: f64,
    ) -> Result<TileRasterPlan> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ViewerError::InvalidArgument(format!(
                "tile scale must be greater than 0, got {}",
                scale
            )));
        }
        check_dimensions(width, height)?;
        if !offset_x.is_finite() || !offset_y.is_finite() {
            return Err(ViewerError::InvalidArgument(format!(
                "tile offset must be finite, got ({}, {})",
                offset_x, offset_y
            )));
        }

        let effective = self.effective_size(page);
        let source_bounds = Rect::new(
            -(effective.width * scale / 2.0) + (effective.width / 2.0) - offset_x,
            -(effective.height * scale / 2.0) + (effective.height / 2.0) + offset_y,
            effective.width * scale,
            effective.height * scale,
        );

        // page space (y up) to pixels, buffer centred on the page centre
        let (w, h) = (width as f64, height as f64);
        let to_pixels = Transform::new(
            1.0,
            0.0,
            0.0,
            -1.0,
            w / 2.0 - effective.width / 2.0,
            effective.height / 2.0 + h / 2.0,
        );

        let page_box = page.box_rect(self.box_kind);
        let transform = upright_transform(&page_box, page.rotation)
            .then(&Transform::scale(scale, scale))
            .then(&Transform::translate(source_bounds.x, source_bounds.y))
            .then(&to_pixels);

        Ok(TileRasterPlan {
            dest_width: width,
            dest_height: height,
            source_bounds,
            fill: self.fill,
            transform,
        })
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(ViewerError::InvalidArgument(format!(
            "output size must be positive, got {}x{}",
            width, height
        )));
    }
    Ok(())
}
