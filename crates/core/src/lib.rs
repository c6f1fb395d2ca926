//! # pdf-tiles-core
//!
//! Page and tile rasterization for PDF viewers.
//!
//! The library answers the questions a zoomable PDF view asks of its native
//! side: how many pages, how big is each page, and what do the pixels of a
//! page or of one tile of a zoomed page look like. Rendering is done by
//! **pdfium** on a dedicated thread; everything here is about getting the
//! geometry right:
//!
//! - page sizes honour the page's intrinsic rotation
//! - full pages render at a scale, optionally clamped to a floor
//! - tiles are addressed so that neighbours mosaic without seams
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_tiles_core::{PageImageRequest, RenderDispatcher, TileRequest, ViewerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let viewer = RenderDispatcher::new(ViewerConfig::keyed())?;
//!
//!     let bytes = std::fs::read("document.pdf")?;
//!     let pages = viewer.open_document(bytes, Some("doc"), None).await?;
//!     println!("{} pages, widths {:?}", pages, viewer.page_widths(Some("doc"))?);
//!
//!     let page = viewer
//!         .full_page_image(&PageImageRequest::new(1, 2.0).for_document("doc"))
//!         .await?;
//!     std::fs::write("page1.png", &page.data)?;
//!
//!     // a 256x256 tile of page 1 zoomed 3x, panned right of the centre
//!     let tile = viewer
//!         .tile_image(&TileRequest::new(1, 3.0, 256, 256).with_offset(256.0, 0.0).for_document("doc"))
//!         .await?;
//!     std::fs::write("tile.png", &tile.data)?;
//!
//!     viewer.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Method Calls
//!
//! ```rust,no_run
//! use pdf_tiles_core::{MethodCall, MethodChannel, RenderDispatcher, ViewerConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let viewer = Arc::new(RenderDispatcher::new(ViewerConfig::single_document())?);
//!     let channel = MethodChannel::new(viewer);
//!
//!     let bytes = std::fs::read("document.pdf")?;
//!     let response = channel
//!         .handle(MethodCall::new("initializePdfRenderer", json!({ "documentBytes": bytes })))
//!         .await;
//!     println!("{:?}", response);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod document;
pub mod encode;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod pdfium;
pub mod worker;

// Re-export main types for convenience
pub use backend::{DocumentHandle, DocumentSource, PaintRequest, PdfBackend, SyntheticBackend};
pub use channel::{MethodCall, MethodChannel, MethodResponse, MethodValue};
pub use config::{
    BoxKind, IdentityModel, PageImageRequest, PdfiumConfig, PixelFormat, RenderConfig,
    RenderedImage, ScalePolicy, TileRequest, ViewerConfig,
};
pub use dispatcher::RenderDispatcher;
pub use document::{Document, DocumentId, DocumentRepository, DocumentStats};
pub use engine::{PageGeometryEngine, RasterPlan, TileRasterPlan};
pub use error::{Result, ViewerError};
pub use geometry::{PageGeometry, Rect, Rotation, Size, Transform};
pub use pdfium::PdfiumBackend;
pub use worker::{RenderWorker, ResidentDocument};

/// Initialize the library's logging.
/// Call this once at application startup if you want to see logs.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}
