use actix_web::{HttpResponse, web};
use log::debug;
use serde_json::Value;

use super::models::{NewPatient, PatientChanges};
use super::store::PatientStore;
use crate::error::ApiError;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/patients/")
            .route(web::get().to(list_patients))
            .route(web::post().to(create_patient)),
    )
    .service(
        web::resource("/api/patients/{id}/")
            .route(web::get().to(get_patient))
            .route(web::put().to(replace_patient))
            .route(web::patch().to(patch_patient))
            .route(web::delete().to(delete_patient)),
    );
}

async fn list_patients(store: web::Data<PatientStore>) -> HttpResponse {
    HttpResponse::Ok().json(store.list().await)
}

async fn create_patient(
    store: web::Data<PatientStore>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let new = NewPatient::from_json(&body).inspect_err(|e| debug!("Rejected patient create: {}", e))?;
    let patient = store.create(new).await?;
    log::info!("Created patient {} ({})", patient.id, patient.display_name());
    Ok(HttpResponse::Created().json(patient))
}

async fn get_patient(
    store: web::Data<PatientStore>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let patient = store.get(*id).await.ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(patient))
}

async fn replace_patient(
    store: web::Data<PatientStore>,
    id: web::Path<i64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    update(&store, *id, &body, false).await
}

async fn patch_patient(
    store: web::Data<PatientStore>,
    id: web::Path<i64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    update(&store, *id, &body, true).await
}

async fn update(
    store: &PatientStore,
    id: i64,
    body: &Value,
    partial: bool,
) -> Result<HttpResponse, ApiError> {
    // Unknown ids are a 404 even when the body is also invalid.
    if store.get(id).await.is_none() {
        return Err(ApiError::NotFound);
    }
    let changes = PatientChanges::from_json(body, partial)
        .inspect_err(|e| debug!("Rejected update of patient {}: {}", id, e))?;
    let patient = store.update(id, changes).await?.ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(patient))
}

async fn delete_patient(
    store: web::Data<PatientStore>,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    if store.delete(*id).await? {
        log::info!("Deleted patient {}", id);
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::NotFound)
    }
}
