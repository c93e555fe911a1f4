use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use tokio::time::timeout;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::codec;
use crate::config::Config;
use crate::errors::SegError;
use crate::segmenter::TiledSegmenter;
use crate::traits::SharedPredictor;

/// Multipart field carrying the uploaded image.
pub const UPLOAD_FIELD: &str = "file";

pub const STATUS_MESSAGE: &str = "Image Segmentation API is running";

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    segmenter: Arc<TiledSegmenter<SharedPredictor>>,
    mask_scale: u8,
    request_timeout: Duration,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(segmenter: TiledSegmenter<SharedPredictor>) -> Self {
        let mask_scale = codec::default_mask_scale(segmenter.num_classes());
        Self {
            segmenter: Arc::new(segmenter),
            mask_scale,
            request_timeout: Duration::from_secs(120),
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }

    pub fn from_config(segmenter: TiledSegmenter<SharedPredictor>, config: &Config) -> Self {
        Self::new(segmenter)
            .with_mask_scale(config.mask_scale())
            .with_request_timeout(config.request_timeout())
            .with_max_upload_bytes(config.max_upload_bytes())
    }

    pub const fn with_mask_scale(mut self, mask_scale: u8) -> Self {
        self.mask_scale = mask_scale;
        self
    }

    pub const fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub const fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub message: String,
}

/// Successful prediction; `mask` is a PNG, base64 encoded on the wire.
#[serde_as]
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictResponse {
    pub success: bool,
    #[serde_as(as = "Base64")]
    pub mask: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors as seen by HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    /// The upload could not be decoded as an image.
    InvalidImage,
    /// The request itself was malformed (missing field).
    BadRequest(String),
    /// Body could not be read; status comes from the multipart extractor
    /// (413 when the upload cap is exceeded).
    Status(StatusCode, String),
    /// Anything that went wrong on our side.
    Internal(String),
}

impl From<SegError> for ApiError {
    fn from(err: SegError) -> Self {
        if err.is_client_error() {
            Self::InvalidImage
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::InvalidImage => (StatusCode::BAD_REQUEST, "Invalid image file".to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Status(status, message) => (status, message),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/predict", post(predict))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        message: STATUS_MESSAGE.to_string(),
    })
}

async fn predict(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let started = Instant::now();
    let upload = read_upload(multipart).await?;
    let upload_len = upload.len();

    let segmenter = Arc::clone(&state.segmenter);
    let mask_scale = state.mask_scale;
    let job = tokio::task::spawn_blocking(move || -> crate::Result<Vec<u8>> {
        let image = codec::decode_image(&upload)?;
        let mask = segmenter.segment(image.view())?;
        codec::encode_mask_png(mask.view(), mask_scale)
    });

    let result = match timeout(state.request_timeout, job).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(join_error)) => Err(ApiError::Internal(format!(
            "segmentation task failed: {join_error}"
        ))),
        Err(_) => Err(ApiError::Internal(format!(
            "request timed out after {:?}",
            state.request_timeout
        ))),
    };

    match result {
        Ok(mask) => {
            info!(
                upload_bytes = upload_len,
                mask_bytes = mask.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "prediction finished"
            );
            Ok(Json(PredictResponse {
                success: true,
                mask,
            }))
        }
        Err(err) => {
            warn!(upload_bytes = upload_len, error = ?err, "prediction failed");
            Err(err)
        }
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::Status(err.status(), err.body_text())
}

/// Pulls the bytes of the `file` field out of a multipart body.
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(multipart_error)?;
            return Ok(bytes.to_vec());
        }
    }
    Err(ApiError::BadRequest(format!(
        "missing multipart field `{UPLOAD_FIELD}`"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_maps_to_invalid_image() {
        let err = codec::decode_image(b"garbage").unwrap_err();
        assert!(matches!(ApiError::from(err), ApiError::InvalidImage));
    }

    #[test]
    fn test_model_error_maps_to_internal() {
        let err = SegError::model("tile inference", "device lost");
        match ApiError::from(err) {
            ApiError::Internal(message) => assert!(message.contains("device lost")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::InvalidImage.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::BadRequest("no file".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Status(StatusCode::PAYLOAD_TOO_LARGE, "too big".into())
                .into_response()
                .status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_predict_response_is_base64() {
        let body = serde_json::to_value(PredictResponse {
            success: true,
            mask: vec![0, 1, 2],
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "mask": "AAEC"}));
    }
}
