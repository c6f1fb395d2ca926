//! Page-space geometry primitives.
//!
//! Coordinates follow PDF conventions unless stated otherwise: user space is
//! measured in points with the origin at the bottom-left and y growing upwards.
//! Raster space has its origin at the top-left with y growing downwards.

use crate::config::BoxKind;
use serde::{Deserialize, Serialize};

/// A width/height pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }

    pub fn swapped(self) -> Self {
        Self::new(self.height, self.width)
    }
}

/// An axis-aligned rectangle given by its origin and size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from PDF-style edges. Edges may be given in any order.
    pub fn from_edges(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        let (x0, x1) = if left <= right { (left, right) } else { (right, left) };
        let (y0, y1) = if bottom <= top { (bottom, top) } else { (top, bottom) };
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.max_x() && y >= self.y && y < self.max_y()
    }

    /// Overlapping area of two rectangles, if any.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        if x1 > x0 && y1 > y0 {
            Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
        } else {
            None
        }
    }
}

/// Intrinsic page rotation, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Degrees90,
    Degrees180,
    Degrees270,
}

impl Rotation {
    /// Normalize a `/Rotate` value. Values that are not multiples of 90 are
    /// truncated towards the previous quarter turn; negative values wrap.
    pub fn from_degrees(degrees: i32) -> Self {
        match (degrees / 90).rem_euclid(4) {
            1 => Rotation::Degrees90,
            2 => Rotation::Degrees180,
            3 => Rotation::Degrees270,
            _ => Rotation::None,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Degrees90 => 90,
            Rotation::Degrees180 => 180,
            Rotation::Degrees270 => 270,
        }
    }

    /// Whether the rotation exchanges width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Degrees90 | Rotation::Degrees270)
    }

    /// Add another rotation to this one.
    pub fn add(self, other: Rotation) -> Rotation {
        Rotation::from_degrees(self.degrees() + other.degrees())
    }
}

/// A 2D affine transform `(x, y) -> (a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub const fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// The transform that applies `self` first and then `next`.
    pub fn then(&self, next: &Transform) -> Transform {
        Transform::new(
            self.a * next.a + self.b * next.c,
            self.a * next.b + self.b * next.d,
            self.c * next.a + self.d * next.c,
            self.c * next.b + self.d * next.d,
            self.e * next.a + self.f * next.c + next.e,
            self.e * next.b + self.f * next.d + next.f,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn invert(&self) -> Option<Transform> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(Transform::new(
            self.d / det,
            -self.b / det,
            -self.c / det,
            self.a / det,
            (self.c * self.f - self.d * self.e) / det,
            (self.b * self.e - self.a * self.f) / det,
        ))
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Bounding box of a transformed rectangle.
    pub fn apply_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.apply(rect.x, rect.y),
            self.apply(rect.max_x(), rect.y),
            self.apply(rect.x, rect.max_y()),
            self.apply(rect.max_x(), rect.max_y()),
        ];
        let mut x0 = f64::INFINITY;
        let mut y0 = f64::INFINITY;
        let mut x1 = f64::NEG_INFINITY;
        let mut y1 = f64::NEG_INFINITY;
        for (x, y) in corners {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// True when the transform only scales and translates.
    pub fn is_axis_aligned(&self) -> bool {
        self.b == 0.0 && self.c == 0.0
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::IDENTITY
    }
}

/// Geometry of a single parsed page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub media_box: Rect,
    /// Absent when the page does not define one.
    pub crop_box: Option<Rect>,
    pub rotation: Rotation,
}

impl PageGeometry {
    pub fn new(media_box: Rect, rotation: Rotation) -> Self {
        Self {
            media_box,
            crop_box: None,
            rotation,
        }
    }

    pub fn with_crop_box(mut self, crop_box: Rect) -> Self {
        self.crop_box = Some(crop_box);
        self
    }

    /// The page rectangle for the given box kind. A crop box is clipped to the
    /// media box and falls back to it when absent or disjoint.
    pub fn box_rect(&self, kind: BoxKind) -> Rect {
        match (kind, self.crop_box) {
            (BoxKind::CropBox, Some(crop)) => {
                crop.intersection(&self.media_box).unwrap_or(self.media_box)
            }
            _ => self.media_box,
        }
    }

    /// Box size after the rotation swap.
    pub fn effective_size(&self, kind: BoxKind) -> Size {
        let size = self.box_rect(kind).size();
        if self.rotation.swaps_axes() {
            size.swapped()
        } else {
            size
        }
    }
}

/// Map user space onto the upright page: rotation applied, box origin moved to
/// `(0, 0)`, y still pointing up. The result spans the effective page size.
pub fn upright_transform(page_box: &Rect, rotation: Rotation) -> Transform {
    let left = page_box.x;
    let bottom = page_box.y;
    let right = page_box.max_x();
    let top = page_box.max_y();
    match rotation {
        Rotation::None => Transform::new(1.0, 0.0, 0.0, 1.0, -left, -bottom),
        Rotation::Degrees90 => Transform::new(0.0, -1.0, 1.0, 0.0, -bottom, right),
        Rotation::Degrees180 => Transform::new(-1.0, 0.0, 0.0, -1.0, right, top),
        Rotation::Degrees270 => Transform::new(0.0, 1.0, -1.0, 0.0, top, -left),
    }
}

/// Map user space onto the displayed page in points with a top-left origin.
pub fn display_transform(page_box: &Rect, rotation: Rotation) -> Transform {
    let height = if rotation.swaps_axes() {
        page_box.width
    } else {
        page_box.height
    };
    upright_transform(page_box, rotation).then(&Transform::new(1.0, 0.0, 0.0, -1.0, 0.0, height))
}

/// Fit a page box into `rect` (y-up), applying the page's own rotation plus
/// `extra`. The page is centred and scaled down to fit, never up.
pub fn drawing_transform(
    page_box: &Rect,
    rotation: Rotation,
    rect: &Rect,
    extra: Rotation,
    preserve_aspect_ratio: bool,
) -> Transform {
    let total = rotation.add(extra);
    let upright = upright_transform(page_box, total);
    let rotated = if total.swaps_axes() {
        page_box.size().swapped()
    } else {
        page_box.size()
    };

    let mut sx = (rect.width / rotated.width).min(1.0);
    let mut sy = (rect.height / rotated.height).min(1.0);
    if preserve_aspect_ratio {
        let s = sx.min(sy);
        sx = s;
        sy = s;
    }

    let tx = rect.x + (rect.width - rotated.width * sx) / 2.0;
    let ty = rect.y + (rect.height - rotated.height * sy) / 2.0;

    upright
        .then(&Transform::scale(sx, sy))
        .then(&Transform::translate(tx, ty))
}
