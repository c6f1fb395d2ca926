//! Python bindings for pdf-tiles using PyO3.
//!
//! This module exposes the page and tile renderer to Python viewers.
//!
//! # Example
//!
//! ```python
//! import asyncio
//! from pdf_tiles import PdfViewer
//!
//! async def main():
//!     viewer = PdfViewer(keyed=True)
//!
//!     with open("document.pdf", "rb") as f:
//!         pages = await viewer.open_document(f.read(), document_id="doc")
//!     print(pages, viewer.page_widths("doc"))
//!
//!     # 256x256 tile of page 1 at 3x zoom
//!     tile = await viewer.tile_image(1, 3.0, 256, 256, document_id="doc")
//!     open("tile.png", "wb").write(tile.data())
//!
//!     await viewer.shutdown()
//!
//! asyncio.run(main())
//! ```

use pdf_tiles_core::config::DEFAULT_MAX_CANVAS_PIXELS;
use pdf_tiles_core::{
    BoxKind, IdentityModel, MethodCall, MethodChannel, PageImageRequest, PixelFormat,
    RenderConfig, RenderDispatcher, RenderedImage, ScalePolicy, TileRequest, ViewerConfig,
    ViewerError,
};
use pyo3::exceptions::{PyIOError, PyIndexError, PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::sync::Arc;
use tracing::warn;

fn to_py_err(e: ViewerError) -> PyErr {
    match e {
        ViewerError::InvalidArgument(_) | ViewerError::InvalidConfig(_) => {
            PyValueError::new_err(e.to_string())
        }
        ViewerError::OutOfRange { .. } => PyIndexError::new_err(e.to_string()),
        ViewerError::NotFound(_) => PyKeyError::new_err(e.to_string()),
        ViewerError::LoadFailed { .. } => PyIOError::new_err(e.to_string()),
        _ => PyRuntimeError::new_err(e.to_string()),
    }
}

/// Python wrapper for RenderedImage.
#[pyclass(name = "RenderedImage")]
#[derive(Clone)]
pub struct PyRenderedImage {
    #[pyo3(get)]
    pub page_number: usize,
    #[pyo3(get)]
    pub width: u32,
    #[pyo3(get)]
    pub height: u32,
    #[pyo3(get)]
    pub format: String,
    data: Vec<u8>,
}

impl From<RenderedImage> for PyRenderedImage {
    fn from(image: RenderedImage) -> Self {
        let format = match image.format {
            PixelFormat::Png => "png",
            PixelFormat::Rgba8 => "rgba8",
        };
        Self {
            page_number: image.page_number,
            width: image.width,
            height: image.height,
            format: format.to_string(),
            data: image.data,
        }
    }
}

#[pymethods]
impl PyRenderedImage {
    fn __repr__(&self) -> String {
        format!(
            "RenderedImage(page={}, size={}x{}, format='{}')",
            self.page_number, self.width, self.height, self.format
        )
    }

    /// Get the image bytes.
    fn data(&self, py: Python<'_>) -> PyResult<Py<pyo3::types::PyBytes>> {
        Ok(pyo3::types::PyBytes::new(py, &self.data).into())
    }

    /// Get the size of the image data in bytes.
    #[getter]
    fn data_size(&self) -> usize {
        self.data.len()
    }
}

/// PDF page and tile renderer.
///
/// Args:
///     keyed: Address documents by identifier (default: True). When False,
///         one document is open at a time and identifiers are ignored.
///     crop_box: Use the crop box instead of the media box (default: False)
///     scale_floor: Minimum full-page scale, or None to honour any scale
///         (default: 2.0)
///     raw_rgba: Return raw RGBA bytes instead of PNG (default: False)
///     max_canvas_pixels: Largest image a single render may produce, in
///         pixels (default: 67108864)
///     library_dir: Directory containing the pdfium library
///
/// Example:
///     >>> viewer = PdfViewer(keyed=False)
///     >>> await viewer.open_document(data)
///     >>> image = await viewer.full_page_image(1, 2.0)
#[pyclass(name = "PdfViewer")]
pub struct PyPdfViewer {
    dispatcher: Arc<RenderDispatcher>,
    channel: MethodChannel,
}

#[pymethods]
impl PyPdfViewer {
    #[new]
    #[pyo3(signature = (
        keyed=true,
        crop_box=false,
        scale_floor=Some(2.0),
        raw_rgba=false,
        max_canvas_pixels=DEFAULT_MAX_CANVAS_PIXELS,
        library_dir=None
    ))]
    fn new(
        keyed: bool,
        crop_box: bool,
        scale_floor: Option<f64>,
        raw_rgba: bool,
        max_canvas_pixels: u64,
        library_dir: Option<String>,
    ) -> PyResult<Self> {
        let render = RenderConfig::default()
            .box_kind(if crop_box {
                BoxKind::CropBox
            } else {
                BoxKind::MediaBox
            })
            .scale_policy(match scale_floor {
                Some(floor) => ScalePolicy::Floor(floor),
                None => ScalePolicy::Unclamped,
            })
            .pixel_format(if raw_rgba {
                PixelFormat::Rgba8
            } else {
                PixelFormat::Png
            })
            .max_canvas_pixels(max_canvas_pixels);

        let mut config = ViewerConfig::default().with_render(render);
        config.identity = if keyed {
            IdentityModel::Keyed
        } else {
            IdentityModel::Single
        };
        if let Some(dir) = library_dir {
            config = config.with_pdfium_dir(dir);
        }

        let dispatcher = Arc::new(RenderDispatcher::new(config).map_err(to_py_err)?);
        let channel = MethodChannel::new(Arc::clone(&dispatcher));
        Ok(Self {
            dispatcher,
            channel,
        })
    }

    /// Open a document and return its page count.
    #[pyo3(signature = (data, document_id=None, password=None))]
    fn open_document<'py>(
        &self,
        py: Python<'py>,
        data: Vec<u8>,
        document_id: Option<String>,
        password: Option<String>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let dispatcher = Arc::clone(&self.dispatcher);

        pyo3_async_runtimes::tokio::future_into_py(py, async move {
            dispatcher
                .open_document(data, document_id.as_deref(), password.as_deref())
                .await
                .map_err(to_py_err)
        })
    }

    /// Close a document. Returns False if it was not open.
    #[pyo3(signature = (document_id=None))]
    fn close_document(&self, document_id: Option<String>) -> PyResult<bool> {
        match self.dispatcher.close_document(document_id.as_deref()) {
            Ok(()) => Ok(true),
            Err(ViewerError::NotFound(_)) => Ok(false),
            Err(e) => Err(to_py_err(e)),
        }
    }

    #[pyo3(signature = (document_id=None))]
    fn page_count(&self, document_id: Option<String>) -> PyResult<usize> {
        self.dispatcher
            .page_count(document_id.as_deref())
            .map_err(to_py_err)
    }

    /// Page widths in points, after rotation.
    #[pyo3(signature = (document_id=None))]
    fn page_widths(&self, document_id: Option<String>) -> PyResult<Vec<f64>> {
        self.dispatcher
            .page_widths(document_id.as_deref())
            .map_err(to_py_err)
    }

    /// Page heights in points, after rotation.
    #[pyo3(signature = (document_id=None))]
    fn page_heights(&self, document_id: Option<String>) -> PyResult<Vec<f64>> {
        self.dispatcher
            .page_heights(document_id.as_deref())
            .map_err(to_py_err)
    }

    /// Render a whole page.
    #[pyo3(signature = (page, scale, document_id=None))]
    fn full_page_image<'py>(
        &self,
        py: Python<'py>,
        page: usize,
        scale: f64,
        document_id: Option<String>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let request = PageImageRequest {
            document_id,
            page,
            scale,
        };

        pyo3_async_runtimes::tokio::future_into_py(py, async move {
            let image = dispatcher
                .full_page_image(&request)
                .await
                .map_err(to_py_err)?;
            Ok(PyRenderedImage::from(image))
        })
    }

    /// Render a page stretched into exactly width x height pixels.
    #[pyo3(signature = (page, width, height, document_id=None))]
    fn page_image<'py>(
        &self,
        py: Python<'py>,
        page: usize,
        width: u32,
        height: u32,
        document_id: Option<String>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let dispatcher = Arc::clone(&self.dispatcher);

        pyo3_async_runtimes::tokio::future_into_py(py, async move {
            let image = dispatcher
                .page_image(document_id.as_deref(), page, width, height)
                .await
                .map_err(to_py_err)?;
            Ok(PyRenderedImage::from(image))
        })
    }

    /// Render one tile of a zoomed page.
    ///
    /// Args:
    ///     x, y: pan of the tile centre from the page centre, in zoomed pixels
    #[pyo3(signature = (page, scale, width, height, x=0.0, y=0.0, document_id=None))]
    #[allow(clippy::too_many_arguments)]
    fn tile_image<'py>(
        &self,
        py: Python<'py>,
        page: usize,
        scale: f64,
        width: u32,
        height: u32,
        x: f64,
        y: f64,
        document_id: Option<String>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let request = TileRequest {
            document_id,
            page,
            scale,
            width,
            height,
            x,
            y,
        };

        pyo3_async_runtimes::tokio::future_into_py(py, async move {
            let image = dispatcher.tile_image(&request).await.map_err(to_py_err)?;
            Ok(PyRenderedImage::from(image))
        })
    }

    /// Render several tiles of one page at one scale.
    ///
    /// Args:
    ///     offsets: list of (x, y) pans
    ///
    /// Returns:
    ///     one RenderedImage per offset, or None where that tile failed
    #[pyo3(signature = (page, scale, width, height, offsets, document_id=None))]
    #[allow(clippy::too_many_arguments)]
    fn tile_images<'py>(
        &self,
        py: Python<'py>,
        page: usize,
        scale: f64,
        width: u32,
        height: u32,
        offsets: Vec<(f64, f64)>,
        document_id: Option<String>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let requests: Vec<TileRequest> = offsets
            .into_iter()
            .map(|(x, y)| TileRequest {
                document_id: document_id.clone(),
                page,
                scale,
                width,
                height,
                x,
                y,
            })
            .collect();

        pyo3_async_runtimes::tokio::future_into_py(py, async move {
            let images: Vec<Option<PyRenderedImage>> = dispatcher
                .tile_images(&requests)
                .await
                .into_iter()
                .map(|result| match result {
                    Ok(image) => Some(PyRenderedImage::from(image)),
                    Err(e) => {
                        warn!("Tile failed: {}", e);
                        None
                    }
                })
                .collect();
            Ok(images)
        })
    }

    /// Dispatch a method call with JSON arguments.
    ///
    /// Returns the JSON-encoded response.
    #[pyo3(signature = (method, arguments="null"))]
    fn invoke_method<'py>(
        &self,
        py: Python<'py>,
        method: String,
        arguments: &str,
    ) -> PyResult<Bound<'py, PyAny>> {
        let arguments: serde_json::Value = serde_json::from_str(arguments)
            .map_err(|e| PyValueError::new_err(format!("Invalid JSON arguments: {}", e)))?;
        let channel = self.channel.clone();

        pyo3_async_runtimes::tokio::future_into_py(py, async move {
            let response = channel.handle(MethodCall::new(method, arguments)).await;
            serde_json::to_string(&response).map_err(|e| PyRuntimeError::new_err(e.to_string()))
        })
    }

    /// Open documents as (id, page_count, byte_len, in_flight) tuples.
    fn open_documents(&self) -> Vec<(String, usize, usize, usize)> {
        self.dispatcher
            .open_documents()
            .into_iter()
            .map(|stats| (stats.id, stats.page_count, stats.byte_len, stats.in_flight))
            .collect()
    }

    /// Stop the render thread and release resources.
    fn shutdown<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        let dispatcher = Arc::clone(&self.dispatcher);

        pyo3_async_runtimes::tokio::future_into_py(py, async move {
            dispatcher.shutdown().await;
            Ok(())
        })
    }

    fn __repr__(&self) -> String {
        let config = self.dispatcher.config();
        format!(
            "PdfViewer(identity={:?}, box={:?}, scale={:?}, documents={})",
            config.identity,
            config.render.box_kind,
            config.render.scale_policy,
            self.dispatcher.documents().len()
        )
    }
}

/// Initialize logging for the library.
#[pyfunction]
fn init_logging() {
    pdf_tiles_core::init_logging();
}

/// Python module definition.
#[pymodule]
fn pdf_tiles(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyPdfViewer>()?;
    m.add_class::<PyRenderedImage>()?;

    m.add_function(wrap_pyfunction!(init_logging, m)?)?;

    Ok(())
}
