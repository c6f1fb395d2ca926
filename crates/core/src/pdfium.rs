//! Page parsing and painting with pdfium (Google's PDF engine).
//!
//! Pages are painted with pdfium's matrix renderer straight into a bitmap the
//! size of the canvas, clipped to it, so the cost of a tile depends on the
//! tile and not on the zoom. Documents stay open on the render thread between
//! calls until the dispatcher releases them.

use crate::backend::{DocumentHandle, DocumentSource, PaintRequest, PdfBackend};
use crate::config::{BoxKind, PdfiumConfig};
use crate::error::{Result, ViewerError};
use crate::geometry::{display_transform, PageGeometry, Rect, Rotation, Transform};
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// The device matrix pdfium puts in front of a caller's matrix: the page's
/// visible box, upright, mapped onto a whole-pixel rectangle with y down.
fn pdfium_display_transform(page_index: usize, page: &PageGeometry) -> Result<Transform> {
    let visible = page.box_rect(BoxKind::CropBox);
    let size = page.effective_size(BoxKind::CropBox);
    let (width, height) = (size.width.trunc(), size.height.trunc());
    if !(width >= 1.0 && height >= 1.0) {
        return Err(ViewerError::RenderFailure {
            page: page_index + 1,
            message: format!(
                "page of {}x{} points is too small to render",
                size.width, size.height
            ),
        });
    }

    Ok(display_transform(&visible, page.rotation)
        .then(&Transform::scale(width / size.width, height / size.height)))
}

/// The matrix to hand pdfium so that page user space lands on the canvas
/// through `transform`.
pub fn render_matrix(
    page_index: usize,
    page: &PageGeometry,
    transform: &Transform,
) -> Result<Transform> {
    let display = pdfium_display_transform(page_index, page)?;
    let inverse = display.invert().ok_or_else(|| ViewerError::RenderFailure {
        page: page_index + 1,
        message: "page has an empty visible box".to_string(),
    })?;
    Ok(inverse.then(transform))
}

/// Bind to the pdfium shared library.
///
/// Searches the configured directory first, then `./`, `/usr/lib`,
/// `/usr/local/lib` and finally the system library path.
pub fn bind_pdfium(config: &PdfiumConfig) -> Result<Pdfium> {
    let mut dirs: Vec<PathBuf> = config.library_dir.iter().cloned().collect();
    dirs.extend(["./", "/usr/lib", "/usr/local/lib"].map(PathBuf::from));

    for dir in &dirs {
        match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)) {
            Ok(bindings) => {
                debug!("Bound pdfium from {:?}", dir);
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => debug!("No pdfium in {:?}: {}", dir, e),
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| ViewerError::PdfiumError(format!("Failed to load pdfium library: {}", e)))
}

fn to_rect(bounds: &PdfRect) -> Rect {
    Rect::from_edges(
        bounds.left().value as f64,
        bounds.bottom().value as f64,
        bounds.right().value as f64,
        bounds.top().value as f64,
    )
}

fn to_rotation(rotation: PdfPageRenderRotation) -> Rotation {
    match rotation {
        PdfPageRenderRotation::None => Rotation::None,
        PdfPageRenderRotation::Degrees90 => Rotation::Degrees90,
        PdfPageRenderRotation::Degrees180 => Rotation::Degrees180,
        PdfPageRenderRotation::Degrees270 => Rotation::Degrees270,
    }
}

fn page_geometry(page: &PdfPage) -> PageGeometry {
    let rotation = page.rotation().map(to_rotation).unwrap_or_default();
    let boundaries = page.boundaries();

    let media_box = boundaries
        .media()
        .map(|b| to_rect(&b.bounds))
        .unwrap_or_else(|_| {
            // width and height are reported after rotation
            let (w, h) = (page.width().value as f64, page.height().value as f64);
            if rotation.swaps_axes() {
                Rect::new(0.0, 0.0, h, w)
            } else {
                Rect::new(0.0, 0.0, w, h)
            }
        });

    let geometry = PageGeometry::new(media_box, rotation);
    match boundaries.crop() {
        Ok(crop) => geometry.with_crop_box(to_rect(&crop.bounds)),
        Err(_) => geometry,
    }
}

/// Backend painting pages with pdfium.
///
/// The library binding is leaked for the life of the process so that open
/// documents can borrow it from the backend's own document table.
pub struct PdfiumBackend {
    pdfium: &'static Pdfium,
    documents: HashMap<DocumentHandle, PdfDocument<'static>>,
}

impl PdfiumBackend {
    pub fn new(config: &PdfiumConfig) -> Result<Self> {
        let pdfium: &'static Pdfium = Box::leak(Box::new(bind_pdfium(config)?));
        info!("pdfium backend initialized");
        Ok(Self {
            pdfium,
            documents: HashMap::new(),
        })
    }

    /// Number of documents currently open in pdfium.
    pub fn open_documents(&self) -> usize {
        self.documents.len()
    }

    fn document(&mut self, request: &PaintRequest) -> Result<&PdfDocument<'static>> {
        match self.documents.entry(request.handle) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                debug!("Reopening document {}", request.handle);
                Ok(entry.insert(open(self.pdfium, &request.source)?))
            }
        }
    }
}

fn open(pdfium: &'static Pdfium, source: &DocumentSource) -> Result<PdfDocument<'static>> {
    pdfium
        .load_pdf_from_byte_vec(source.bytes.to_vec(), source.password.as_deref())
        .map_err(|e| ViewerError::PdfiumError(format!("Failed to load PDF: {}", e)))
}

impl PdfBackend for PdfiumBackend {
    fn load(
        &mut self,
        handle: DocumentHandle,
        source: &DocumentSource,
    ) -> Result<Vec<PageGeometry>> {
        let document = open(self.pdfium, source)?;
        let page_count = document.pages().len() as usize;

        let mut pages = Vec::with_capacity(page_count);
        for page_idx in 0..page_count {
            let page = document.pages().get(page_idx as u16).map_err(|e| {
                ViewerError::PdfiumError(format!("Failed to get page {}: {}", page_idx + 1, e))
            })?;
            pages.push(page_geometry(&page));
        }

        self.documents.insert(handle, document);
        debug!("Loaded {} pages as document {}", page_count, handle);
        Ok(pages)
    }

    fn paint(&mut self, request: &PaintRequest, canvas: &mut RgbaImage) -> Result<()> {
        let start = Instant::now();
        let matrix = render_matrix(request.page_index, &request.page, &request.transform)?;
        let (width, height) = canvas.dimensions();
        let (bitmap_width, bitmap_height) = match (i32::try_from(width), i32::try_from(height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => {
                return Err(request.failure(format!(
                    "canvas of {}x{} is too large",
                    width, height
                )))
            }
        };

        let pdfium = self.pdfium;
        let document = self.document(request)?;
        let page = document
            .pages()
            .get(request.page_index as u16)
            .map_err(|e| request.failure(format!("Failed to get page: {}", e)))?;

        let fill = request.fill.0;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(1.0)
            .transform(
                matrix.a as f32,
                matrix.b as f32,
                matrix.c as f32,
                matrix.d as f32,
                matrix.e as f32,
                matrix.f as f32,
            )
            .map_err(|e| request.failure(format!("Invalid render matrix: {}", e)))?
            .clip(0, 0, bitmap_width, bitmap_height)
            .set_clear_color(PdfColor::new(fill[0], fill[1], fill[2], 255));

        let mut bitmap = PdfBitmap::empty(
            bitmap_width,
            bitmap_height,
            PdfBitmapFormat::BGRA,
            pdfium.bindings(),
        )
        .map_err(|e| request.failure(format!("Failed to allocate bitmap: {}", e)))?;

        page.render_into_bitmap_with_config(&mut bitmap, &render_config)
            .map_err(|e| request.failure(format!("Failed to render page: {}", e)))?;

        let rendered: RgbaImage = bitmap.as_image().into_rgba8();
        if rendered.dimensions() != (width, height) {
            return Err(request.failure(format!(
                "pdfium returned {}x{} for a {}x{} canvas",
                rendered.width(),
                rendered.height(),
                width,
                height
            )));
        }
        *canvas = rendered;

        debug!(
            page = request.page_index + 1,
            document = %request.handle,
            canvas = %format!("{}x{}", width, height),
            "Painted page in {:?}",
            start.elapsed()
        );
        Ok(())
    }

    fn release(&mut self, handle: DocumentHandle) {
        if self.documents.remove(&handle).is_some() {
            debug!("Closed document {} in pdfium", handle);
        }
    }
}
