//! Error types for page and tile rendering.

use thiserror::Error;

/// Main error type for the pdf-tiles library.
#[derive(Error, Debug)]
pub enum ViewerError {
    /// A request argument (scale, output size, offset, document id) is unusable.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Page index outside `[1, page_count]`.
    #[error("Page {index} is out of range, document has {page_count} pages")]
    OutOfRange { index: usize, page_count: usize },

    /// Unknown document identifier.
    #[error("Document not found: '{0}'")]
    NotFound(String),

    /// The document bytes could not be parsed.
    #[error("Failed to load document '{id}': {message}")]
    LoadFailed { id: String, message: String },

    /// The backend could not produce pixels for a page.
    #[error("Rendering page {page} failed: {message}")]
    RenderFailure { page: usize, message: String },

    /// Pdfium library error.
    #[error("Pdfium error: {0}")]
    PdfiumError(String),

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncodingError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The render worker has been shut down.
    #[error("Render worker has been shut down")]
    WorkerShutdown,

    /// Channel communication error.
    #[error("Internal channel error: {0}")]
    ChannelError(String),
}

impl ViewerError {
    /// Short machine-readable code, used as the error code on the method channel.
    pub fn code(&self) -> &'static str {
        match self {
            ViewerError::InvalidArgument(_) => "InvalidArgument",
            ViewerError::OutOfRange { .. } => "OutOfRange",
            ViewerError::NotFound(_) | ViewerError::LoadFailed { .. } => "NotFound",
            ViewerError::RenderFailure { .. } => "RenderFailure",
            ViewerError::PdfiumError(_) => "PdfiumError",
            ViewerError::PngEncodingError(_) => "PngEncodingError",
            ViewerError::InvalidConfig(_) => "InvalidConfig",
            ViewerError::WorkerShutdown | ViewerError::ChannelError(_) => "Unavailable",
        }
    }

    pub fn is_render_failure(&self) -> bool {
        matches!(self, ViewerError::RenderFailure { .. })
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, ViewerError>;

impl From<async_channel::RecvError> for ViewerError {
    fn from(_: async_channel::RecvError) -> Self {
        ViewerError::ChannelError("Channel closed".to_string())
    }
}

impl<T> From<async_channel::SendError<T>> for ViewerError {
    fn from(_: async_channel::SendError<T>) -> Self {
        ViewerError::WorkerShutdown
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ViewerError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        ViewerError::ChannelError("Render worker dropped the reply".to_string())
    }
}
