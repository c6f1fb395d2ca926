//! Request orchestration: resolve the document and page, plan the raster,
//! paint it on the render thread and encode the result.

use crate::backend::{DocumentSource, PaintRequest, PdfBackend};
use crate::config::{PageImageRequest, RenderedImage, TileRequest, ViewerConfig};
use crate::document::{Document, DocumentRepository, DocumentStats};
use crate::encode::encode_image;
use crate::engine::PageGeometryEngine;
use crate::error::{Result, ViewerError};
use crate::geometry::Transform;
use crate::pdfium::PdfiumBackend;
use crate::worker::RenderWorker;
use futures::future::join_all;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Entry point for all viewer operations.
///
/// Page-count and size queries are answered from cached geometry. Renders
/// run on the render thread and PNG encoding on the blocking pool, so many
/// requests may be in flight at once.
#[derive(Debug)]
pub struct RenderDispatcher {
    config: ViewerConfig,
    engine: PageGeometryEngine,
    documents: DocumentRepository,
    worker: RenderWorker,
}

impl RenderDispatcher {
    /// Create a dispatcher rendering with pdfium.
    pub fn new(config: ViewerConfig) -> Result<Self> {
        let pdfium = config.pdfium.clone();
        Self::with_backend(config, move || PdfiumBackend::new(&pdfium))
    }

    /// Create a dispatcher around a custom backend, built on the render thread.
    pub fn with_backend<B, F>(config: ViewerConfig, factory: F) -> Result<Self>
    where
        B: PdfBackend + 'static,
        F: FnOnce() -> Result<B> + Send + 'static,
    {
        config.validate()?;

        let worker = RenderWorker::spawn(factory)?;
        let engine = PageGeometryEngine::new(&config.render);
        let documents = DocumentRepository::new(config.identity);

        info!(
            "Dispatcher initialized: identity={:?}, box={:?}, scale={:?}, format={:?}",
            config.identity,
            config.render.box_kind,
            config.render.scale_policy,
            config.render.pixel_format
        );

        Ok(Self {
            config,
            engine,
            documents,
            worker,
        })
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn engine(&self) -> &PageGeometryEngine {
        &self.engine
    }

    pub fn documents(&self) -> &DocumentRepository {
        &self.documents
    }

    /// Open a document and return its page count.
    pub async fn open_document(
        &self,
        bytes: impl Into<Arc<[u8]>>,
        id: Option<&str>,
        password: Option<&str>,
    ) -> Result<usize> {
        let start = Instant::now();
        let doc_id = self.documents.resolve_id(id)?;

        let mut source = DocumentSource::new(bytes);
        if let Some(password) = password {
            source = source.with_password(password);
        }

        let (resident, pages) = self
            .worker
            .load(source.clone())
            .await
            .map_err(|e| match e {
                ViewerError::WorkerShutdown | ViewerError::ChannelError(_) => e,
                other => ViewerError::LoadFailed {
                    id: doc_id.to_string(),
                    message: other.to_string(),
                },
            })?;

        let page_count = pages.len();
        self.documents
            .insert(Document::new(doc_id.clone(), source, pages, resident));

        info!(
            "Opened document '{}' with {} pages in {:?}",
            doc_id,
            page_count,
            start.elapsed()
        );
        Ok(page_count)
    }

    /// Open a document and return its page count as a decimal string.
    pub async fn initialize_document(
        &self,
        bytes: impl Into<Arc<[u8]>>,
        id: Option<&str>,
    ) -> Result<String> {
        self.open_document(bytes, id, None)
            .await
            .map(|count| count.to_string())
    }

    /// Close a document. Renders already holding it finish normally, and the
    /// render thread lets go of it after the last of them.
    pub fn close_document(&self, id: Option<&str>) -> Result<()> {
        let doc_id = self.documents.resolve_id(id)?;
        self.documents.release(&doc_id)?;
        info!("Closed document '{}'", doc_id);
        Ok(())
    }

    fn document(&self, id: Option<&str>) -> Result<Arc<Document>> {
        let doc_id = self.documents.resolve_id(id)?;
        self.documents.acquire(&doc_id)
    }

    pub fn page_count(&self, id: Option<&str>) -> Result<usize> {
        Ok(self.document(id)?.page_count())
    }

    /// Effective page widths in page order.
    pub fn page_widths(&self, id: Option<&str>) -> Result<Vec<f64>> {
        let document = self.document(id)?;
        Ok(document
            .pages()
            .iter()
            .map(|page| self.engine.effective_size(page).width)
            .collect())
    }

    /// Effective page heights in page order.
    pub fn page_heights(&self, id: Option<&str>) -> Result<Vec<f64>> {
        let document = self.document(id)?;
        Ok(document
            .pages()
            .iter()
            .map(|page| self.engine.effective_size(page).height)
            .collect())
    }

    /// Render a whole page at `request.scale`, after the scale policy.
    pub async fn full_page_image(&self, request: &PageImageRequest) -> Result<RenderedImage> {
        let document = self.document(request.document_id.as_deref())?;
        let page = document.page(request.page)?;
        let plan = self.engine.full_page_plan(page, request.scale)?;

        debug!(
            "Full page {} of '{}' at scale {} -> {}x{}",
            request.page,
            document.id(),
            request.scale,
            plan.width_px(),
            plan.height_px()
        );

        self.render(
            &document,
            request.page,
            plan.transform,
            plan.width_px(),
            plan.height_px(),
            plan.fill,
        )
        .await
    }

    /// Render a page stretched over exactly `width x height` pixels.
    pub async fn page_image(
        &self,
        id: Option<&str>,
        page_number: usize,
        width: u32,
        height: u32,
    ) -> Result<RenderedImage> {
        let document = self.document(id)?;
        let page = document.page(page_number)?;
        let plan = self.engine.stretched_page_plan(page, width, height)?;

        debug!(
            "Stretched page {} of '{}' -> {}x{}",
            page_number,
            document.id(),
            width,
            height
        );

        self.render(&document, page_number, plan.transform, width, height, plan.fill)
            .await
    }

    /// Render one tile of a zoomed page.
    pub async fn tile_image(&self, request: &TileRequest) -> Result<RenderedImage> {
        let document = self.document(request.document_id.as_deref())?;
        let page = document.page(request.page)?;
        let plan = self.engine.tile_plan(
            page,
            request.scale,
            request.width,
            request.height,
            request.x,
            request.y,
        )?;

        debug!(
            "Tile of page {} of '{}' at scale {} offset ({}, {}) -> {}x{}",
            request.page,
            document.id(),
            request.scale,
            request.x,
            request.y,
            plan.dest_width,
            plan.dest_height
        );

        self.render(
            &document,
            request.page,
            plan.transform,
            plan.dest_width,
            plan.dest_height,
            plan.fill,
        )
        .await
    }

    /// Render several tiles. Results come back in request order; one failing
    /// tile does not affect the others.
    pub async fn tile_images(&self, requests: &[TileRequest]) -> Vec<Result<RenderedImage>> {
        let start = Instant::now();
        let results = join_all(requests.iter().map(|request| self.tile_image(request))).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!("{} of {} tiles failed", failed, requests.len());
        }
        debug!("Rendered {} tiles in {:?}", requests.len(), start.elapsed());
        results
    }

    /// Statistics for every open document.
    pub fn open_documents(&self) -> Vec<DocumentStats> {
        self.documents.open_documents()
    }

    /// Stop the render thread. Later renders fail with `WorkerShutdown`.
    pub async fn shutdown(&self) {
        self.worker.shutdown().await;
    }

    async fn render(
        &self,
        document: &Arc<Document>,
        page_number: usize,
        transform: Transform,
        width: u32,
        height: u32,
        fill: Rgba<u8>,
    ) -> Result<RenderedImage> {
        let page = *document.page(page_number)?;
        let limit = self.config.render.max_canvas_pixels;
        let pixels = width as u64 * height as u64;
        if pixels > limit {
            return Err(ViewerError::RenderFailure {
                page: page_number,
                message: format!(
                    "canvas of {}x{} exceeds the {} pixel limit",
                    width, height, limit
                ),
            });
        }

        let canvas = self
            .worker
            .paint(PaintRequest {
                handle: document.handle(),
                source: document.source().clone(),
                page_index: page_number - 1,
                page,
                transform,
                width,
                height,
                fill,
            })
            .await?;

        self.encode(page_number, canvas).await
    }

    async fn encode(&self, page_number: usize, canvas: RgbaImage) -> Result<RenderedImage> {
        let format = self.config.render.pixel_format;
        let compression = self.config.render.png_compression;
        let (width, height) = canvas.dimensions();

        let data = tokio::task::spawn_blocking(move || encode_image(canvas, format, compression))
            .await
            .map_err(|e| ViewerError::ChannelError(format!("Encoding task failed: {}", e)))??;

        Ok(RenderedImage {
            page_number,
            width,
            height,
            format,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SyntheticBackend;
    use crate::config::{PixelFormat, RenderConfig, ScalePolicy};
    use crate::geometry::{PageGeometry, Rect, Rotation};
    use std::sync::atomic::Ordering;

    fn letter(rotation: Rotation) -> PageGeometry {
        PageGeometry::new(Rect::new(0.0, 0.0, 612.0, 792.0), rotation)
    }

    fn dispatcher(config: ViewerConfig) -> RenderDispatcher {
        RenderDispatcher::with_backend(config, || Ok(SyntheticBackend::new())).unwrap()
    }

    #[tokio::test]
    async fn test_open_and_query_sizes() {
        let viewer = dispatcher(ViewerConfig::keyed());
        let bytes = SyntheticBackend::document_bytes(&[
            letter(Rotation::None),
            letter(Rotation::Degrees90),
        ]);

        let count = viewer.initialize_document(bytes, Some("doc")).await.unwrap();
        assert_eq!(count, "2");
        assert_eq!(viewer.page_count(Some("doc")).unwrap(), 2);
        assert_eq!(viewer.page_widths(Some("doc")).unwrap(), vec![612.0, 792.0]);
        assert_eq!(viewer.page_heights(Some("doc")).unwrap(), vec![792.0, 612.0]);
    }

    #[tokio::test]
    async fn test_open_failure_is_load_failed() {
        let viewer = dispatcher(ViewerConfig::keyed());
        let err = viewer
            .open_document(b"not a pdf".to_vec(), Some("bad"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::LoadFailed { ref id, .. } if id == "bad"));
        assert_eq!(err.code(), "NotFound");
        assert!(viewer.documents().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let viewer = dispatcher(ViewerConfig::keyed());
        assert!(matches!(
            viewer.page_widths(Some("nope")),
            Err(ViewerError::NotFound(_))
        ));
        assert!(matches!(
            viewer.close_document(Some("nope")),
            Err(ViewerError::NotFound(_))
        ));
        let err = viewer
            .tile_image(&TileRequest::new(1, 1.0, 10, 10).for_document("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_full_page_raw_rgba() {
        let config = ViewerConfig::keyed().with_render(
            RenderConfig::default()
                .scale_policy(ScalePolicy::Unclamped)
                .pixel_format(PixelFormat::Rgba8),
        );
        let viewer = dispatcher(config);
        let bytes = SyntheticBackend::document_bytes(&[letter(Rotation::None)]);
        viewer.open_document(bytes, Some("a"), None).await.unwrap();

        let image = viewer
            .full_page_image(&PageImageRequest::new(1, 0.5).for_document("a"))
            .await
            .unwrap();
        assert_eq!((image.width, image.height), (306, 396));
        assert_eq!(image.format, PixelFormat::Rgba8);
        assert_eq!(image.data.len(), 306 * 396 * 4);
    }

    #[tokio::test]
    async fn test_stretched_page_image() {
        let viewer = dispatcher(ViewerConfig::single_document());
        let bytes = SyntheticBackend::document_bytes(&[letter(Rotation::None)]);
        viewer.open_document(bytes, None, None).await.unwrap();

        let image = viewer.page_image(None, 1, 120, 80).await.unwrap();
        assert_eq!((image.width, image.height), (120, 80));
        assert_eq!(image.page_number, 1);
    }

    #[tokio::test]
    async fn test_tile_batch_keeps_order() {
        let viewer = dispatcher(ViewerConfig::single_document());
        let bytes = SyntheticBackend::document_bytes(&[letter(Rotation::None)]);
        viewer.open_document(bytes, None, None).await.unwrap();

        let results = viewer
            .tile_images(&[
                TileRequest::new(1, 2.0, 64, 32),
                TileRequest::new(2, 2.0, 64, 32),
                TileRequest::new(1, 2.0, 16, 48).with_offset(100.0, 0.0),
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().map(|i| i.width).unwrap(), 64);
        assert!(matches!(results[1], Err(ViewerError::OutOfRange { .. })));
        assert_eq!(results[2].as_ref().map(|i| i.height).unwrap(), 48);
    }

    #[tokio::test]
    async fn test_oversized_canvas_leaves_worker_serving() {
        let config = ViewerConfig::single_document().with_render(
            RenderConfig::default()
                .scale_policy(ScalePolicy::Unclamped)
                .pixel_format(PixelFormat::Rgba8),
        );
        let viewer = dispatcher(config);
        let bytes = SyntheticBackend::document_bytes(&[letter(Rotation::None)]);
        viewer.open_document(bytes, None, None).await.unwrap();

        let err = viewer
            .full_page_image(&PageImageRequest::new(1, 1e7))
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::RenderFailure { page: 1, .. }));
        let err = viewer
            .tile_image(&TileRequest::new(1, 1.0, u32::MAX, u32::MAX))
            .await
            .unwrap_err();
        assert!(err.is_render_failure());

        let image = viewer
            .full_page_image(&PageImageRequest::new(1, 0.1))
            .await
            .unwrap();
        assert_eq!((image.width, image.height), (61, 79));
    }

    #[tokio::test]
    async fn test_canvas_limit_is_configurable() {
        let config = ViewerConfig::single_document()
            .with_render(RenderConfig::default().max_canvas_pixels(100 * 100));
        let viewer = dispatcher(config);
        let bytes = SyntheticBackend::document_bytes(&[letter(Rotation::None)]);
        viewer.open_document(bytes, None, None).await.unwrap();

        assert!(viewer.tile_image(&TileRequest::new(1, 1.0, 100, 100)).await.is_ok());
        let err = viewer
            .tile_image(&TileRequest::new(1, 1.0, 101, 100))
            .await
            .unwrap_err();
        assert!(err.is_render_failure());
    }

    #[tokio::test]
    async fn test_close_and_replace_release_backend_documents() {
        let backend = SyntheticBackend::new();
        let resident = backend.resident_documents();
        let viewer =
            RenderDispatcher::with_backend(ViewerConfig::keyed(), move || Ok(backend)).unwrap();
        let bytes = SyntheticBackend::document_bytes(&[letter(Rotation::None)]);

        viewer.open_document(bytes.clone(), Some("a"), None).await.unwrap();
        viewer.open_document(bytes.clone(), Some("b"), None).await.unwrap();
        assert_eq!(resident.load(Ordering::SeqCst), 2);

        // replacing "a" and closing "b" each queue a release ahead of the next load
        viewer.open_document(bytes.clone(), Some("a"), None).await.unwrap();
        viewer.close_document(Some("b")).unwrap();
        viewer.open_document(bytes, Some("c"), None).await.unwrap();
        assert_eq!(resident.load(Ordering::SeqCst), 2);
        assert_eq!(viewer.documents().len(), 2);
    }

    #[tokio::test]
    async fn test_render_after_shutdown() {
        let viewer = dispatcher(ViewerConfig::single_document());
        let bytes = SyntheticBackend::document_bytes(&[letter(Rotation::None)]);
        viewer.open_document(bytes, None, None).await.unwrap();
        viewer.shutdown().await;

        let err = viewer
            .tile_image(&TileRequest::new(1, 1.0, 10, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ViewerError::WorkerShutdown));
        // cached geometry is still served
        assert_eq!(viewer.page_count(None).unwrap(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ViewerConfig::default()
            .with_render(RenderConfig::default().scale_policy(ScalePolicy::Floor(-1.0)));
        let result = RenderDispatcher::with_backend(config, || Ok(SyntheticBackend::new()));
        assert!(matches!(result, Err(ViewerError::InvalidConfig(_))));
    }
}
