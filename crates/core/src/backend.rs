//! The seam between the dispatcher and the PDF library.
//!
//! A backend parses document bytes into page geometry and paints a page into
//! an RGBA canvas through a user-space to pixel transform. Backends are driven
//! from a single render thread and need not be `Send` themselves.

use crate::config::BoxKind;
use crate::error::{Result, ViewerError};
use crate::geometry::{PageGeometry, Transform};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Raw document bytes plus the password needed to open them.
#[derive(Clone)]
pub struct DocumentSource {
    pub bytes: Arc<[u8]>,
    pub password: Option<String>,
}

impl DocumentSource {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl std::fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSource")
            .field("bytes", &self.bytes.len())
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Key of a document held open by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(pub u64);

impl std::fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything a backend needs to paint one page.
#[derive(Debug, Clone)]
pub struct PaintRequest {
    pub handle: DocumentHandle,
    /// Bytes to reopen the document from if the backend no longer holds it.
    pub source: DocumentSource,
    /// 0-based page index.
    pub page_index: usize,
    pub page: PageGeometry,
    pub transform: Transform,
    pub width: u32,
    pub height: u32,
    /// Opaque colour for every pixel the page does not cover.
    pub fill: Rgba<u8>,
}

impl PaintRequest {
    pub(crate) fn failure(&self, message: impl Into<String>) -> ViewerError {
        ViewerError::RenderFailure {
            page: self.page_index + 1,
            message: message.into(),
        }
    }
}

/// A PDF library capable of parsing and painting pages.
pub trait PdfBackend {
    /// Parse the document, keep it open under `handle` and return the
    /// geometry of every page, in order.
    fn load(&mut self, handle: DocumentHandle, source: &DocumentSource)
        -> Result<Vec<PageGeometry>>;

    /// Paint `request.page_index` into `canvas`, a `request.width` by
    /// `request.height` image already filled with `request.fill`.
    ///
    /// Only pixels inside the page's visible box change.
    fn paint(&mut self, request: &PaintRequest, canvas: &mut RgbaImage) -> Result<()>;

    /// Drop whatever the backend keeps for `handle`. Unknown handles are ignored.
    fn release(&mut self, handle: DocumentHandle);
}

/// Side length of a pattern cell, in points.
pub const SYNTHETIC_CELL: f64 = 16.0;

#[derive(Debug, Serialize, Deserialize)]
struct SyntheticDocument {
    #[serde(default)]
    password: Option<String>,
    pages: Vec<PageGeometry>,
}

/// An in-process backend that reads page geometry from JSON and paints a
/// procedural checker pattern.
///
/// Pixels are sampled at their centres, so two renders whose transforms
/// differ by a whole-pixel translation produce identical pixels. Useful for
/// exercising the dispatcher without a pdfium library.
#[derive(Debug, Default, Clone)]
pub struct SyntheticBackend {
    pixel_limit: Option<u64>,
    open: HashSet<DocumentHandle>,
    resident: Arc<AtomicUsize>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any paint whose canvas exceeds `pixels`, the way a real library
    /// fails when it cannot allocate a bitmap.
    pub fn with_pixel_limit(mut self, pixels: u64) -> Self {
        self.pixel_limit = Some(pixels);
        self
    }

    /// Counter of documents currently held open, shared with every clone.
    pub fn resident_documents(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.resident)
    }

    /// Serialize pages into bytes this backend can load.
    pub fn document_bytes(pages: &[PageGeometry]) -> Vec<u8> {
        Self::encode(None, pages)
    }

    /// Like [`SyntheticBackend::document_bytes`] but requiring a password.
    pub fn protected_document_bytes(password: &str, pages: &[PageGeometry]) -> Vec<u8> {
        Self::encode(Some(password.to_string()), pages)
    }

    fn encode(password: Option<String>, pages: &[PageGeometry]) -> Vec<u8> {
        let document = SyntheticDocument {
            password,
            pages: pages.to_vec(),
        };
        // plain data with no maps keyed by non-strings, serialization cannot fail
        serde_json::to_vec(&document).unwrap_or_default()
    }

    /// The colour painted at user-space point `(x, y)` of `page`, or `None`
    /// when the point lies outside the visible box.
    pub fn color_at(page: &PageGeometry, x: f64, y: f64) -> Option<Rgba<u8>> {
        let visible = page.box_rect(BoxKind::CropBox);
        if !visible.contains(x, y) {
            return None;
        }
        let cx = ((x - visible.x) / SYNTHETIC_CELL).floor() as i64;
        let cy = ((y - visible.y) / SYNTHETIC_CELL).floor() as i64;
        let shade = if (cx + cy) % 2 == 0 { 40 } else { 200 };
        Some(Rgba([
            (cx.rem_euclid(64) * 4) as u8,
            (cy.rem_euclid(64) * 4) as u8,
            shade,
            255,
        ]))
    }
}

impl PdfBackend for SyntheticBackend {
    fn load(
        &mut self,
        handle: DocumentHandle,
        source: &DocumentSource,
    ) -> Result<Vec<PageGeometry>> {
        let document: SyntheticDocument = serde_json::from_slice(&source.bytes)
            .map_err(|e| ViewerError::InvalidArgument(format!("not a document: {}", e)))?;

        if let Some(expected) = &document.password {
            if source.password.as_ref() != Some(expected) {
                return Err(ViewerError::InvalidArgument(
                    "incorrect password".to_string(),
                ));
            }
        }

        self.open.insert(handle);
        self.resident.store(self.open.len(), Ordering::SeqCst);
        Ok(document.pages)
    }

    fn paint(&mut self, request: &PaintRequest, canvas: &mut RgbaImage) -> Result<()> {
        let pixels = canvas.width() as u64 * canvas.height() as u64;
        if let Some(limit) = self.pixel_limit {
            if pixels > limit {
                return Err(request.failure(format!(
                    "canvas of {} pixels exceeds limit {}",
                    pixels, limit
                )));
            }
        }

        let inverse = request
            .transform
            .invert()
            .ok_or_else(|| request.failure("degenerate transform"))?;

        for (px, py, pixel) in canvas.enumerate_pixels_mut() {
            let (x, y) = inverse.apply(px as f64 + 0.5, py as f64 + 0.5);
            if let Some(color) = Self::color_at(&request.page, x, y) {
                *pixel = color;
            }
        }
        Ok(())
    }

    fn release(&mut self, handle: DocumentHandle) {
        self.open.remove(&handle);
        self.resident.store(self.open.len(), Ordering::SeqCst);
    }
}
