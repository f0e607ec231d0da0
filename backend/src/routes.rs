use actix_multipart::Multipart;
use actix_web::{Error, HttpRequest, HttpResponse, error::JsonPayloadError, web};
use futures::{StreamExt, TryStreamExt};
use log::{debug, error};
use serde_json::{Value, json};

use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::features::{self, SURVIVAL_COLUMNS};
use crate::imaging;
use crate::inference;
use crate::models::{InferenceError, ModelKind, ModelRegistry};
use crate::patients;
use crate::validation::records::{SurvivalFeatures, TreatmentFeatures};
use crate::validation::{FeatureRecord, ValidationError};

const IMAGE_FIELD: &str = "image";
const NO_FILE: &str = "No file was submitted.";
const EMPTY_FILE: &str = "The submitted file is empty.";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(web::resource("/api/image-predict/").route(web::post().to(image_predict)))
        .service(web::resource("/api/predict/").route(web::post().to(treatment_predict)))
        .service(web::resource("/api/predict-survival/").route(web::post().to(survival_predict)))
        .service(web::resource("/api/health/").route(web::get().to(health)))
        .configure(patients::routes::configure);
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> Error {
    debug!("Rejected JSON body: {}", err);
    ApiError::MalformedBody(err.to_string()).into()
}

fn unavailable(registry: &ModelRegistry, model: ModelKind) -> ApiError {
    ApiError::ModelUnavailable {
        model,
        fix: format!(
            "Place the trained model at {} and restart the server.",
            registry.artifact_path(model).display()
        ),
    }
}

fn log_failure(model: ModelKind, err: InferenceError) -> ApiError {
    error!("Error during {}: {}", model, err);
    ApiError::Inference(err)
}

async fn image_predict(
    registry: web::Data<ModelRegistry>,
    config: web::Data<ServiceConfig>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let model = registry
        .image()
        .ok_or_else(|| unavailable(&registry, ModelKind::Image))?;

    let limit = config.server.max_upload_bytes;
    let mut upload: Option<Vec<u8>> = None;
    while let Some(mut field) = payload.try_next().await? {
        if upload.is_some() || field.name() != Some(IMAGE_FIELD) {
            // Drain fields we do not use so the stream can advance.
            while field.next().await.is_some() {}
            continue;
        }
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if data.len() + chunk.len() > limit {
                let err = ValidationError::single(
                    IMAGE_FIELD,
                    format!("Ensure the uploaded file is no larger than {limit} bytes."),
                );
                return Err(ApiError::from(err).into());
            }
            data.extend_from_slice(&chunk);
        }
        upload = Some(data);
    }

    let bytes = match upload {
        None => return Err(ApiError::from(ValidationError::single(IMAGE_FIELD, NO_FILE)).into()),
        Some(bytes) if bytes.is_empty() => {
            return Err(ApiError::from(ValidationError::single(IMAGE_FIELD, EMPTY_FILE)).into());
        }
        Some(bytes) => bytes,
    };

    let image_config = &config.models.image;
    let batch = imaging::preprocess(&bytes, image_config.target_size()).map_err(|e| {
        debug!("Rejected upload of {} bytes: {}", bytes.len(), e);
        ApiError::from(e)
    })?;
    let prediction = inference::run_image(model, &batch, &image_config.class_names)
        .map_err(|e| log_failure(ModelKind::Image, e))?;
    Ok(HttpResponse::Ok().json(prediction))
}

async fn treatment_predict(
    registry: web::Data<ModelRegistry>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let record = TreatmentFeatures::from_json(&body)
        .inspect_err(|e| debug!("Rejected treatment request: {}", e))?;
    let model = registry
        .treatment()
        .ok_or_else(|| unavailable(&registry, ModelKind::Treatment))?;

    let row = features::from_record(&record)?;
    let recommendation =
        inference::run_treatment(model, &row).map_err(|e| log_failure(ModelKind::Treatment, e))?;
    Ok(HttpResponse::Ok().json(recommendation))
}

async fn survival_predict(
    registry: web::Data<ModelRegistry>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let model = registry
        .survival()
        .ok_or_else(|| unavailable(&registry, ModelKind::Survival))?;
    let record = SurvivalFeatures::from_json(&body)
        .inspect_err(|e| debug!("Rejected survival request: {}", e))?;

    let row = features::from_columns(&record, &SURVIVAL_COLUMNS)
        .inspect_err(|e| debug!("{}", e))?;
    let prediction =
        inference::run_survival(model, &row).map_err(|e| log_failure(ModelKind::Survival, e))?;
    Ok(HttpResponse::Ok().json(prediction))
}

async fn health(registry: web::Data<ModelRegistry>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "models": registry.status(),
    }))
}
