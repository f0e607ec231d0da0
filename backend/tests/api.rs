use std::io::Cursor;
use std::sync::{Arc, Mutex};

use actix_web::http::StatusCode;
use actix_web::http::header::ContentType;
use actix_web::{App, test, web};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use serde_json::{Value, json};

use oncopredict::config::ServiceConfig;
use oncopredict::features::{FeatureRow, FeatureValue, SURVIVAL_COLUMNS};
use oncopredict::models::{ImageClassifier, InferenceError, ModelRegistry, TabularModel};
use oncopredict::patients::PatientStore;
use oncopredict::routes::configure_routes;

struct FixedTreatment(Vec<i64>);

impl TabularModel for FixedTreatment {
    fn predict(&self, _row: &FeatureRow) -> Result<Vec<i64>, InferenceError> {
        Ok(self.0.clone())
    }

    fn predict_proba(&self, _row: &FeatureRow) -> Result<Vec<f64>, InferenceError> {
        Ok(vec![0.5, 0.5])
    }
}

/// Remembers the last row it was handed.
struct RecordingSurvival {
    label: i64,
    proba: Vec<f64>,
    seen: Mutex<Option<FeatureRow>>,
}

impl RecordingSurvival {
    fn new(label: i64, proba: Vec<f64>) -> Arc<Self> {
        Arc::new(Self {
            label,
            proba,
            seen: Mutex::new(None),
        })
    }
}

impl TabularModel for RecordingSurvival {
    fn predict(&self, row: &FeatureRow) -> Result<Vec<i64>, InferenceError> {
        *self.seen.lock().unwrap() = Some(row.clone());
        Ok(vec![self.label])
    }

    fn predict_proba(&self, _row: &FeatureRow) -> Result<Vec<f64>, InferenceError> {
        Ok(self.proba.clone())
    }
}

struct Failing;

impl TabularModel for Failing {
    fn predict(&self, _row: &FeatureRow) -> Result<Vec<i64>, InferenceError> {
        Err(InferenceError::Model("booster exploded".into()))
    }

    fn predict_proba(&self, _row: &FeatureRow) -> Result<Vec<f64>, InferenceError> {
        Err(InferenceError::Model("booster exploded".into()))
    }
}

struct FixedImage(Vec<f32>);

impl ImageClassifier for FixedImage {
    fn predict(&self, batch: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        assert_eq!(batch.dim(), (1, 224, 224, 3));
        Ok(self.0.clone())
    }
}

macro_rules! test_app {
    ($registry:expr) => {
        test_app!($registry, PatientStore::in_memory())
    };
    ($registry:expr, $store:expr) => {
        test_app!($registry, $store, ServiceConfig::default())
    };
    ($registry:expr, $store:expr, $config:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($registry))
                .app_data(web::Data::new($store))
                .app_data(web::Data::new($config))
                .configure(configure_routes),
        )
        .await
    };
}

fn treatment_body() -> Value {
    json!({
        "age_at_diagnosis": 48.5,
        "neoplasm_histologic_grade": 3,
        "her2_status": "Negative",
        "er_status": "Positive",
        "pr_status": "Positive",
        "tumor_size": 22.0,
        "tumor_stage": 2,
        "lymph_nodes_examined_positive": 1,
        "mutation_count": 5,
        "nottingham_prognostic_index": 4.04,
        "inferred_menopausal_state": "Post",
        "brca1": -0.31,
        "brca2": 0.12,
        "tp53": 0.85,
        "erbb2": -0.42,
        "esr1": 1.21,
        "pgr": 0.66,
        "akt1": -0.05,
        "pik3ca": 0.44,
        "mki67": 0.93,
        "cdh1": -0.18
    })
}

fn survival_body() -> Value {
    let mut body = treatment_body();
    let extra = json!({
        "overall_survival_months": 140.5,
        "relapse_free_status_months": 118.2,
        "tmb_nonsynonymous": 2.6,
        "bcl10": 0.21,
        "cfh": -0.47,
        "rbm14": 0.09,
        "taok2": 0.33,
        "dusp11": -0.12,
        "iscu": 0.58,
        "marchf6": -0.26,
        "mob3b": 0.14,
        "dnajb6": 0.71,
        "atg12": -0.39
    });
    body.as_object_mut()
        .unwrap()
        .extend(extra.as_object().unwrap().clone());
    body
}

const BOUNDARY: &str = "----oncopredict-test-boundary";

fn multipart(field: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"scan.png\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(64, 48, Rgb([200, 120, 90]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn upload(field: &str, bytes: &[u8]) -> test::TestRequest {
    let (content_type, body) = multipart(field, bytes);
    test::TestRequest::post()
        .uri("/api/image-predict/")
        .insert_header(("content-type", content_type))
        .set_payload(body)
}

#[actix_web::test]
async fn treatment_outputs_map_to_yes_no() {
    let registry = ModelRegistry::default().with_treatment(Arc::new(FixedTreatment(vec![1, 0, 1])));
    let app = test_app!(registry);

    let req = test::TestRequest::post()
        .uri("/api/predict/")
        .set_json(treatment_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body,
        json!({"Chemotherapy": "Yes", "Radio Therapy": "No", "Hormone Therapy": "Yes"})
    );
}

#[actix_web::test]
async fn treatment_validates_before_checking_the_model() {
    let app = test_app!(ModelRegistry::default());

    let mut body = treatment_body();
    body["her2_status"] = json!("positive");
    body.as_object_mut().unwrap().remove("tumor_size");
    let req = test::TestRequest::post().uri("/api/predict/").set_json(body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["her2_status"], json!(["HER2 Status must be 'Positive' or 'Negative'."]));
    assert_eq!(body["tumor_size"], json!(["This field is required."]));

    let req = test::TestRequest::post()
        .uri("/api/predict/")
        .set_json(treatment_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("Model is not available."));
    assert!(body["fix"].is_string());
}

#[actix_web::test]
async fn survival_reports_probability_of_predicted_class() {
    let model = RecordingSurvival::new(0, vec![0.8, 0.2]);
    let registry = ModelRegistry::default().with_survival(model.clone());
    let app = test_app!(registry);

    let req = test::TestRequest::post()
        .uri("/api/predict-survival/")
        .set_json(survival_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"prediction": "Living", "probability": 0.8}));

    let seen = model.seen.lock().unwrap().clone().unwrap();
    let columns: Vec<&str> = seen.columns().collect();
    assert_eq!(columns, SURVIVAL_COLUMNS);
    assert_eq!(seen.get("Overall Survival (Months)"), Some(FeatureValue::Number(140.5)));
    assert_eq!(seen.get("HER2 Status"), Some(FeatureValue::Category("Negative")));
}

#[actix_web::test]
async fn survival_deceased_uses_second_probability() {
    let registry = ModelRegistry::default().with_survival(RecordingSurvival::new(1, vec![0.3, 0.7]));
    let app = test_app!(registry);

    let req = test::TestRequest::post()
        .uri("/api/predict-survival/")
        .set_json(survival_body())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"prediction": "Deceased", "probability": 0.7}));
}

#[actix_web::test]
async fn survival_checks_the_model_before_validating() {
    let app = test_app!(ModelRegistry::default());
    let req = test::TestRequest::post()
        .uri("/api/predict-survival/")
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn survival_missing_field_is_named() {
    let registry = ModelRegistry::default().with_survival(RecordingSurvival::new(0, vec![0.5, 0.5]));
    let app = test_app!(registry);

    let mut body = survival_body();
    body.as_object_mut().unwrap().remove("cfh");
    let req = test::TestRequest::post()
        .uri("/api/predict-survival/")
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"cfh": ["This field is required."]}));
}

#[actix_web::test]
async fn inference_failure_is_a_500_with_the_cause() {
    let registry = ModelRegistry::default().with_survival(Arc::new(Failing));
    let app = test_app!(registry);

    let req = test::TestRequest::post()
        .uri("/api/predict-survival/")
        .set_json(survival_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Prediction failed: booster exploded");
}

#[actix_web::test]
async fn malformed_json_is_a_400() {
    let registry = ModelRegistry::default().with_treatment(Arc::new(FixedTreatment(vec![0, 0, 0])));
    let app = test_app!(registry);

    let req = test::TestRequest::post()
        .uri("/api/predict/")
        .insert_header(ContentType::json())
        .set_payload("{\"age_at_diagnosis\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("JSON parse error - "));
}

#[actix_web::test]
async fn image_prediction_takes_the_top_class() {
    let registry = ModelRegistry::default().with_image(Arc::new(FixedImage(vec![0.25, 0.75])));
    let app = test_app!(registry);

    let resp = test::call_service(&app, upload("image", &png_bytes()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"prediction": "malignant", "confidence": 0.75}));
}

#[actix_web::test]
async fn corrupt_image_is_rejected() {
    let registry = ModelRegistry::default().with_image(Arc::new(FixedImage(vec![1.0, 0.0])));
    let app = test_app!(registry);

    let resp = test::call_service(&app, upload("image", b"GIF89a but not really").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "Invalid or corrupted image file."}));

    let resp = test::call_service(&app, upload("image", b"").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"image": ["The submitted file is empty."]}));

    let resp = test::call_service(&app, upload("scan", &png_bytes()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"image": ["No file was submitted."]}));
}

#[actix_web::test]
async fn oversized_upload_fails_validation() {
    let mut config = ServiceConfig::default();
    config.server.max_upload_bytes = 32;
    let registry = ModelRegistry::default().with_image(Arc::new(FixedImage(vec![0.5, 0.5])));
    let app = test_app!(registry, PatientStore::in_memory(), config);

    let png = png_bytes();
    assert!(png.len() > 32);
    let resp = test::call_service(&app, upload("image", &png).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body,
        json!({"image": ["Ensure the uploaded file is no larger than 32 bytes."]})
    );
}

#[actix_web::test]
async fn image_without_model_is_unavailable() {
    let app = test_app!(ModelRegistry::default());
    let resp = test::call_service(&app, upload("image", &png_bytes()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn health_reports_loaded_models() {
    let registry = ModelRegistry::default().with_treatment(Arc::new(FixedTreatment(vec![0, 0, 0])));
    let app = test_app!(registry);
    let req = test::TestRequest::get().uri("/api/health/").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        body,
        json!({"status": "ok", "models": {"image": false, "treatment": true, "survival": false}})
    );
}

#[actix_web::test]
async fn patient_crud_round_trip() {
    let app = test_app!(ModelRegistry::default());

    let req = test::TestRequest::post()
        .uri("/api/patients/")
        .set_json(json!({
            "first_name": "Jane",
            "last_name": "Doe",
            "date_of_birth": "1975-04-12",
            "gender": "Female",
            "stage": "Stage II",
            "email": "jane@example.org"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["stage"], "Stage II");
    assert_eq!(created["status"], "");

    let req = test::TestRequest::patch()
        .uri(&format!("/api/patients/{id}/"))
        .set_json(json!({"status": "Under Treatment"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let patched: Value = test::read_body_json(resp).await;
    assert_eq!(patched["status"], "Under Treatment");
    assert_eq!(patched["first_name"], "Jane");

    let req = test::TestRequest::put()
        .uri(&format!("/api/patients/{id}/"))
        .set_json(json!({"first_name": "Janet"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let errors: Value = test::read_body_json(resp).await;
    assert_eq!(errors["last_name"], json!(["This field is required."]));

    let req = test::TestRequest::get().uri("/api/patients/").to_request();
    let listed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/patients/{id}/"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/patients/{id}/"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"detail": "Not found."}));
}

#[actix_web::test]
async fn patient_create_reports_every_bad_field() {
    let app = test_app!(ModelRegistry::default());
    let req = test::TestRequest::post()
        .uri("/api/patients/")
        .set_json(json!({
            "first_name": "",
            "date_of_birth": "12/04/1975",
            "gender": "Unknown",
            "email": "not-an-email"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["first_name"], json!(["This field may not be blank."]));
    assert_eq!(body["last_name"], json!(["This field is required."]));
    assert_eq!(
        body["date_of_birth"],
        json!(["Date has wrong format. Use one of these formats instead: YYYY-MM-DD."])
    );
    assert_eq!(body["gender"], json!(["\"Unknown\" is not a valid choice."]));
    assert_eq!(body["email"], json!(["Enter a valid email address."]));
}

#[actix_web::test]
async fn patients_persist_through_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patients.json");

    {
        let store = PatientStore::open(Some(path.clone())).unwrap();
        let app = test_app!(ModelRegistry::default(), store);
        let req = test::TestRequest::post()
            .uri("/api/patients/")
            .set_json(json!({
                "first_name": "Ada",
                "last_name": "Byron",
                "date_of_birth": "1815-12-10",
                "gender": "Female"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
    }

    let app = test_app!(ModelRegistry::default(), PatientStore::open(Some(path)).unwrap());
    let req = test::TestRequest::get().uri("/api/patients/1/").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["last_name"], "Byron");
}
