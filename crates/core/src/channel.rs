//! Method-call surface for UI bridges.
//!
//! A call is a method name plus JSON arguments. Both the current method names
//! and the names used by older viewer front ends are accepted. Numbers may be
//! sent as JSON numbers or as numeric strings.

use crate::config::{PageImageRequest, TileRequest};
use crate::dispatcher::RenderDispatcher;
use crate::error::{Result, ViewerError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Method names understood by [`MethodChannel`].
pub mod methods {
    pub const INITIALIZE: &str = "initializePdfRenderer";
    pub const INITIALIZE_DOCUMENT: &str = "initializeDocument";
    pub const CLOSE_DOCUMENT: &str = "closeDocument";
    pub const PAGES_WIDTH: &str = "getPagesWidth";
    pub const PAGE_WIDTHS: &str = "getPageWidths";
    pub const PAGES_HEIGHT: &str = "getPagesHeight";
    pub const PAGE_HEIGHTS: &str = "getPageHeights";
    pub const IMAGE: &str = "getImage";
    pub const FULL_PAGE_IMAGE: &str = "getFullPageImage";
    pub const TILE_IMAGE: &str = "getTileImage";
    /// Legacy: page stretched into an exact pixel size.
    pub const PAGE: &str = "getPage";
}

/// An incoming call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// A successful result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum MethodValue {
    Null,
    Bool(bool),
    String(String),
    Doubles(Vec<f64>),
    Bytes(Vec<u8>),
}

/// The answer to a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MethodResponse {
    Success { value: MethodValue },
    /// Rendering produced no pixels. Distinct from both success and error.
    Empty,
    Error { code: String, message: String },
    NotImplemented,
}

impl MethodResponse {
    fn from_result(method: &str, result: Result<MethodValue>) -> Self {
        match result {
            Ok(value) => MethodResponse::Success { value },
            Err(e) if e.is_render_failure() => {
                warn!("{} produced no image: {}", method, e);
                MethodResponse::Empty
            }
            Err(e) => {
                debug!("{} failed: {}", method, e);
                MethodResponse::Error {
                    code: e.code().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResponse::Success { .. })
    }
}

/// A number sent either as a JSON number or as a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn as_f64(&self, name: &str) -> Result<f64> {
        match self {
            Numeric::Number(n) => Ok(*n),
            Numeric::Text(s) => s.trim().parse().map_err(|_| {
                ViewerError::InvalidArgument(format!("{} must be a number, got '{}'", name, s))
            }),
        }
    }

    /// Integral and non-negative.
    fn as_count(&self, name: &str) -> Result<u64> {
        let value = self.as_f64(name)?;
        if value.fract() != 0.0 || value < 0.0 || value > u32::MAX as f64 {
            return Err(ViewerError::InvalidArgument(format!(
                "{} must be a non-negative integer, got {}",
                name, value
            )));
        }
        Ok(value as u64)
    }

    /// Pixel extent: fractional values are truncated.
    fn as_extent(&self, name: &str) -> Result<u32> {
        let value = self.as_f64(name)?;
        if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
            return Err(ViewerError::InvalidArgument(format!(
                "{} must be a non-negative size, got {}",
                name, value
            )));
        }
        Ok(value as u32)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeArgs {
    document_bytes: Vec<u8>,
    #[serde(rename = "documentID", default)]
    document_id: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageArgs {
    #[serde(alias = "pageIndex")]
    index: Numeric,
    scale: Numeric,
    #[serde(rename = "documentID", default)]
    document_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TileArgs {
    #[serde(alias = "pageIndex")]
    page_number: Numeric,
    scale: Numeric,
    width: Numeric,
    height: Numeric,
    x: Numeric,
    y: Numeric,
    #[serde(rename = "documentID", default)]
    document_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageArgs {
    index: Numeric,
    width: Numeric,
    height: Numeric,
    #[serde(rename = "documentID", default)]
    document_id: Option<String>,
}

fn parse<T: DeserializeOwned>(method: &str, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| ViewerError::InvalidArgument(format!("bad arguments for {}: {}", method, e)))
}

/// Arguments that are just an optional document identifier.
fn document_id(method: &str, arguments: Value) -> Result<Option<String>> {
    match arguments {
        Value::Null => Ok(None),
        Value::String(id) => Ok(Some(id)),
        Value::Object(mut map) => match map.remove("documentID") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(id)) => Ok(Some(id)),
            Some(other) => Err(ViewerError::InvalidArgument(format!(
                "documentID for {} must be a string, got {}",
                method, other
            ))),
        },
        other => Err(ViewerError::InvalidArgument(format!(
            "{} expects a document identifier, got {}",
            method, other
        ))),
    }
}

/// Routes method calls to a [`RenderDispatcher`].
#[derive(Debug, Clone)]
pub struct MethodChannel {
    dispatcher: Arc<RenderDispatcher>,
}

impl MethodChannel {
    pub fn new(dispatcher: Arc<RenderDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<RenderDispatcher> {
        &self.dispatcher
    }

    /// Handle one call.
    pub async fn handle(&self, call: MethodCall) -> MethodResponse {
        let MethodCall { method, arguments } = call;
        debug!("Method call {}", method);

        let result = match method.as_str() {
            methods::INITIALIZE | methods::INITIALIZE_DOCUMENT => {
                self.initialize(&method, arguments).await
            }
            methods::CLOSE_DOCUMENT => return self.close(&method, arguments),
            methods::PAGES_WIDTH | methods::PAGE_WIDTHS => document_id(&method, arguments)
                .and_then(|id| self.dispatcher.page_widths(id.as_deref()))
                .map(MethodValue::Doubles),
            methods::PAGES_HEIGHT | methods::PAGE_HEIGHTS => document_id(&method, arguments)
                .and_then(|id| self.dispatcher.page_heights(id.as_deref()))
                .map(MethodValue::Doubles),
            methods::IMAGE | methods::FULL_PAGE_IMAGE => self.image(&method, arguments).await,
            methods::TILE_IMAGE => self.tile(&method, arguments).await,
            methods::PAGE => self.page(&method, arguments).await,
            _ => {
                debug!("Unknown method {}", method);
                return MethodResponse::NotImplemented;
            }
        };

        MethodResponse::from_result(&method, result)
    }

    async fn initialize(&self, method: &str, arguments: Value) -> Result<MethodValue> {
        let args = match arguments {
            // bare bytes, as sent by single-document front ends
            Value::Array(_) => InitializeArgs {
                document_bytes: parse(method, arguments)?,
                document_id: None,
                password: None,
            },
            other => parse(method, other)?,
        };

        let count = self
            .dispatcher
            .open_document(
                args.document_bytes,
                args.document_id.as_deref(),
                args.password.as_deref(),
            )
            .await?;
        Ok(MethodValue::String(count.to_string()))
    }

    fn close(&self, method: &str, arguments: Value) -> MethodResponse {
        let result = document_id(method, arguments).and_then(|id| {
            match self.dispatcher.close_document(id.as_deref()) {
                Ok(()) => Ok(MethodValue::Bool(true)),
                Err(ViewerError::NotFound(_)) => Ok(MethodValue::Bool(false)),
                Err(e) => Err(e),
            }
        });
        MethodResponse::from_result(method, result)
    }

    async fn image(&self, method: &str, arguments: Value) -> Result<MethodValue> {
        let args: ImageArgs = parse(method, arguments)?;
        let request = PageImageRequest {
            document_id: args.document_id,
            page: args.index.as_count("index")? as usize,
            scale: args.scale.as_f64("scale")?,
        };
        let image = self.dispatcher.full_page_image(&request).await?;
        Ok(MethodValue::Bytes(image.data))
    }

    async fn tile(&self, method: &str, arguments: Value) -> Result<MethodValue> {
        let args: TileArgs = parse(method, arguments)?;
        let request = TileRequest {
            document_id: args.document_id,
            page: args.page_number.as_count("pageNumber")? as usize,
            scale: args.scale.as_f64("scale")?,
            width: args.width.as_extent("width")?,
            height: args.height.as_extent("height")?,
            x: args.x.as_f64("x")?,
            y: args.y.as_f64("y")?,
        };
        let image = self.dispatcher.tile_image(&request).await?;
        Ok(MethodValue::Bytes(image.data))
    }

    async fn page(&self, method: &str, arguments: Value) -> Result<MethodValue> {
        let args: PageArgs = parse(method, arguments)?;
        let image = self
            .dispatcher
            .page_image(
                args.document_id.as_deref(),
                args.index.as_count("index")? as usize,
                args.width.as_count("width")? as u32,
                args.height.as_count("height")? as u32,
            )
            .await?;
        Ok(MethodValue::Bytes(image.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SyntheticBackend;
    use crate::config::{RenderConfig, ScalePolicy, ViewerConfig};
    use crate::geometry::{PageGeometry, Rect, Rotation};
    use serde_json::json;

    fn channel(config: ViewerConfig, backend: SyntheticBackend) -> MethodChannel {
        let dispatcher = RenderDispatcher::with_backend(config, move || Ok(backend)).unwrap();
        MethodChannel::new(Arc::new(dispatcher))
    }

    fn letter_bytes() -> Vec<u8> {
        SyntheticBackend::document_bytes(&[PageGeometry::new(
            Rect::new(0.0, 0.0, 612.0, 792.0),
            Rotation::None,
        )])
    }

    async fn open(channel: &MethodChannel, id: &str) {
        let response = channel
            .handle(MethodCall::new(
                methods::INITIALIZE,
                json!({ "documentBytes": letter_bytes(), "documentID": id }),
            ))
            .await;
        assert_eq!(
            response,
            MethodResponse::Success {
                value: MethodValue::String("1".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_sizes_by_string_argument() {
        let channel = channel(ViewerConfig::keyed(), SyntheticBackend::new());
        open(&channel, "doc").await;

        let widths = channel
            .handle(MethodCall::new(methods::PAGES_WIDTH, json!("doc")))
            .await;
        assert_eq!(
            widths,
            MethodResponse::Success {
                value: MethodValue::Doubles(vec![612.0])
            }
        );

        let heights = channel
            .handle(MethodCall::new(
                methods::PAGE_HEIGHTS,
                json!({ "documentID": "doc" }),
            ))
            .await;
        assert_eq!(
            heights,
            MethodResponse::Success {
                value: MethodValue::Doubles(vec![792.0])
            }
        );
    }

    #[tokio::test]
    async fn test_numeric_strings_accepted() {
        let channel = channel(ViewerConfig::keyed(), SyntheticBackend::new());
        open(&channel, "doc").await;

        let response = channel
            .handle(MethodCall::new(
                methods::TILE_IMAGE,
                json!({
                    "pageNumber": "1", "scale": "2.0", "x": 0, "y": "0",
                    "width": 64.7, "height": 32, "documentID": "doc"
                }),
            ))
            .await;
        match response {
            MethodResponse::Success {
                value: MethodValue::Bytes(png),
            } => {
                let decoded = image::load_from_memory(&png).unwrap();
                assert_eq!((decoded.width(), decoded.height()), (64, 32));
            }
            other => panic!("Expected image, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_arguments_are_invalid_argument() {
        let channel = channel(ViewerConfig::keyed(), SyntheticBackend::new());
        open(&channel, "doc").await;

        for arguments in [
            json!({ "index": 1, "documentID": "doc" }),
            json!({ "index": 1.5, "scale": 2, "documentID": "doc" }),
            json!({ "index": "one", "scale": 2, "documentID": "doc" }),
        ] {
            let response = channel
                .handle(MethodCall::new(methods::IMAGE, arguments))
                .await;
            assert!(
                matches!(response, MethodResponse::Error { ref code, .. } if code == "InvalidArgument"),
                "{:?}",
                response
            );
        }
    }

    #[tokio::test]
    async fn test_out_of_range_page() {
        let channel = channel(ViewerConfig::keyed(), SyntheticBackend::new());
        open(&channel, "doc").await;

        for index in [0, 2] {
            let response = channel
                .handle(MethodCall::new(
                    methods::IMAGE,
                    json!({ "index": index, "scale": 2.0, "documentID": "doc" }),
                ))
                .await;
            assert!(
                matches!(response, MethodResponse::Error { ref code, .. } if code == "OutOfRange")
            );
        }
    }

    #[tokio::test]
    async fn test_render_failure_is_empty() {
        let channel = channel(
            ViewerConfig::keyed(),
            SyntheticBackend::new().with_pixel_limit(1000),
        );
        open(&channel, "doc").await;

        let response = channel
            .handle(MethodCall::new(
                methods::IMAGE,
                json!({ "index": 1, "scale": 2.0, "documentID": "doc" }),
            ))
            .await;
        assert_eq!(response, MethodResponse::Empty);
    }

    #[tokio::test]
    async fn test_oversized_image_is_empty_and_channel_recovers() {
        let config = ViewerConfig::keyed()
            .with_render(RenderConfig::default().scale_policy(ScalePolicy::Unclamped));
        let channel = channel(config, SyntheticBackend::new());
        open(&channel, "doc").await;

        let huge = channel
            .handle(MethodCall::new(
                methods::IMAGE,
                json!({ "index": 1, "scale": 1e7, "documentID": "doc" }),
            ))
            .await;
        assert_eq!(huge, MethodResponse::Empty);

        let small = channel
            .handle(MethodCall::new(
                methods::IMAGE,
                json!({ "index": 1, "scale": 0.1, "documentID": "doc" }),
            ))
            .await;
        assert!(matches!(
            small,
            MethodResponse::Success {
                value: MethodValue::Bytes(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_close_document() {
        let channel = channel(ViewerConfig::keyed(), SyntheticBackend::new());
        open(&channel, "doc").await;

        let first = channel
            .handle(MethodCall::new(methods::CLOSE_DOCUMENT, json!("doc")))
            .await;
        assert_eq!(
            first,
            MethodResponse::Success {
                value: MethodValue::Bool(true)
            }
        );
        let second = channel
            .handle(MethodCall::new(methods::CLOSE_DOCUMENT, json!("doc")))
            .await;
        assert_eq!(
            second,
            MethodResponse::Success {
                value: MethodValue::Bool(false)
            }
        );
    }

    #[tokio::test]
    async fn test_single_document_bare_bytes() {
        let channel = channel(ViewerConfig::single_document(), SyntheticBackend::new());
        let response = channel
            .handle(MethodCall::new(methods::INITIALIZE, json!(letter_bytes())))
            .await;
        assert!(response.is_success());

        let response = channel
            .handle(MethodCall::new(
                methods::PAGE,
                json!({ "index": 1, "width": 100, "height": 50 }),
            ))
            .await;
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_unparseable_document_is_not_found() {
        let channel = channel(ViewerConfig::keyed(), SyntheticBackend::new());
        let response = channel
            .handle(MethodCall::new(
                methods::INITIALIZE,
                json!({ "documentBytes": [1, 2, 3], "documentID": "x" }),
            ))
            .await;
        assert!(matches!(response, MethodResponse::Error { ref code, .. } if code == "NotFound"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let channel = channel(ViewerConfig::keyed(), SyntheticBackend::new());
        let response = channel
            .handle(MethodCall::new("getTextLines", Value::Null))
            .await;
        assert_eq!(response, MethodResponse::NotImplemented);
    }

    #[test]
    fn test_response_serialization() {
        let response = MethodResponse::Success {
            value: MethodValue::Doubles(vec![1.0]),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            json!({ "status": "success", "value": { "type": "doubles", "value": [1.0] } })
        );
        assert_eq!(
            serde_json::to_value(MethodResponse::Empty).unwrap(),
            json!({ "status": "empty" })
        );
    }
}
