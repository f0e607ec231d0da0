use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Hormone-receptor / HER2 status as recorded in the clinical data.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
    IntoStaticStr,
)]
pub enum ReceptorStatus {
    Positive,
    Negative,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
    IntoStaticStr,
)]
pub enum MenopausalState {
    Post,
    Pre,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
    IntoStaticStr,
)]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
    IntoStaticStr,
)]
pub enum CancerStage {
    #[serde(rename = "Stage 0")]
    #[strum(serialize = "Stage 0")]
    Stage0,
    #[serde(rename = "Stage I")]
    #[strum(serialize = "Stage I")]
    StageI,
    #[serde(rename = "Stage II")]
    #[strum(serialize = "Stage II")]
    StageII,
    #[serde(rename = "Stage III")]
    #[strum(serialize = "Stage III")]
    StageIII,
    #[serde(rename = "Stage IV")]
    #[strum(serialize = "Stage IV")]
    StageIV,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
    IntoStaticStr,
)]
pub enum PatientStatus {
    Active,
    #[serde(rename = "Under Treatment")]
    #[strum(serialize = "Under Treatment")]
    UnderTreatment,
    Recovered,
    Critical,
}

/// Answer of the image classification endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImagePrediction {
    pub prediction: String,
    pub confidence: f64,
}

/// Answer of the treatment endpoint, one "Yes"/"No" per therapy.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TreatmentRecommendation {
    #[serde(rename = "Chemotherapy")]
    pub chemotherapy: String,
    #[serde(rename = "Radio Therapy")]
    pub radio_therapy: String,
    #[serde(rename = "Hormone Therapy")]
    pub hormone_therapy: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SurvivalPrediction {
    pub prediction: String,
    pub probability: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}
