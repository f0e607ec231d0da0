//! Inference runners and response mappers.
//!
//! Each runner makes exactly one synchronous call into the model per request
//! (plus one probability call on the survival path) and maps the raw output
//! through a fixed lookup.

use ndarray::Array4;
use shared::{ImagePrediction, SurvivalPrediction, TreatmentRecommendation};

use crate::features::FeatureRow;
use crate::models::{ImageClassifier, InferenceError, TabularModel};

pub const LIVING: &str = "Living";
pub const DECEASED: &str = "Deceased";
pub const UNKNOWN_CLASS: &str = "unknown";

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// `{1: "Yes", 0: "No"}`, anything else reads as "No".
pub fn treatment_label(raw: i64) -> &'static str {
    match raw {
        1 => "Yes",
        _ => "No",
    }
}

pub fn survival_label(raw: i64) -> &'static str {
    match raw {
        0 => LIVING,
        _ => DECEASED,
    }
}

pub fn map_treatment(raw: &[i64]) -> Result<TreatmentRecommendation, InferenceError> {
    match raw {
        [chemo, radio, hormone, ..] => Ok(TreatmentRecommendation {
            chemotherapy: treatment_label(*chemo).to_string(),
            radio_therapy: treatment_label(*radio).to_string(),
            hormone_therapy: treatment_label(*hormone).to_string(),
        }),
        _ => Err(InferenceError::Model(format!(
            "expected 3 treatment outputs, got {}",
            raw.len()
        ))),
    }
}

/// Reports the probability of the predicted class.
pub fn map_survival(label: i64, proba: &[f64]) -> Result<SurvivalPrediction, InferenceError> {
    let [living, deceased, ..] = proba else {
        return Err(InferenceError::Model(format!(
            "expected 2 class probabilities, got {}",
            proba.len()
        )));
    };
    if proba.iter().any(|p| !p.is_finite()) {
        return Err(InferenceError::Model("model returned non-finite probabilities".into()));
    }
    let prediction = survival_label(label);
    let probability = if prediction == LIVING { *living } else { *deceased };
    Ok(SurvivalPrediction {
        prediction: prediction.to_string(),
        probability: round4(probability),
    })
}

pub fn map_image(scores: &[f32], class_names: &[String]) -> Result<ImagePrediction, InferenceError> {
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(InferenceError::Model("model returned non-finite scores".into()));
    }
    let (index, confidence) = scores
        .iter()
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .ok_or_else(|| InferenceError::Model("model returned no scores".into()))?;
    let prediction = class_names
        .get(index)
        .map(String::as_str)
        .unwrap_or(UNKNOWN_CLASS);
    Ok(ImagePrediction {
        prediction: prediction.to_string(),
        confidence: round4(f64::from(confidence)),
    })
}

pub fn run_treatment(
    model: &dyn TabularModel,
    row: &FeatureRow,
) -> Result<TreatmentRecommendation, InferenceError> {
    let labels = model.predict(row)?;
    map_treatment(&labels)
}

pub fn run_survival(
    model: &dyn TabularModel,
    row: &FeatureRow,
) -> Result<SurvivalPrediction, InferenceError> {
    let labels = model.predict(row)?;
    let label = labels
        .first()
        .copied()
        .ok_or_else(|| InferenceError::Model("model returned no prediction".into()))?;
    let proba = model.predict_proba(row)?;
    map_survival(label, &proba)
}

pub fn run_image(
    model: &dyn ImageClassifier,
    batch: &Array4<f32>,
    class_names: &[String],
) -> Result<ImagePrediction, InferenceError> {
    let scores = model.predict(batch)?;
    map_image(&scores, class_names)
}
