use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use shared::ErrorResponse;

use crate::features::MissingFeatureError;
use crate::imaging::ImageDecodeError;
use crate::models::{InferenceError, ModelKind};
use crate::patients::store::StoreError;
use crate::validation::ValidationError;

/// Every failure a request can end in, rendered as a JSON body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid or corrupted image file.")]
    InvalidImage(#[from] ImageDecodeError),
    #[error(transparent)]
    MissingFeature(#[from] MissingFeatureError),
    #[error("{model} model is not available")]
    ModelUnavailable { model: ModelKind, fix: String },
    #[error("Prediction failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("JSON parse error - {0}")]
    MalformedBody(String),
    #[error("Not found.")]
    NotFound,
    #[error("Patient store error: {0}")]
    Store(#[from] StoreError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidImage(_)
            | ApiError::MissingFeature(_)
            | ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Inference(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        match self {
            ApiError::Validation(errors) => builder.json(errors),
            ApiError::NotFound => builder.json(json!({ "detail": self.to_string() })),
            ApiError::ModelUnavailable { model, fix } => builder.json(ErrorResponse {
                error: format!(
                    "Model is not available. The {} model failed to load at startup, check the server logs.",
                    model
                ),
                fix: Some(fix.clone()),
            }),
            _ => builder.json(ErrorResponse {
                error: self.to_string(),
                fix: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn taxonomy_maps_to_status_codes() {
        let (status, body) = body_of(ValidationError::single("tumor_size", "A valid number is required.").into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"tumor_size": ["A valid number is required."]}));

        let (status, body) = body_of(MissingFeatureError("cfh".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing feature in request data: 'cfh'");

        let (status, body) = body_of(ApiError::ModelUnavailable {
            model: ModelKind::Survival,
            fix: "restart".into(),
        })
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["fix"], "restart");

        let (status, body) = body_of(InferenceError::Model("shape (1, 3) vs (1, 4)".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Prediction failed: shape (1, 3) vs (1, 4)");

        let (status, body) = body_of(ApiError::NotFound).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Not found."}));
    }
}
