use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use shared::{CancerStage, Gender, PatientStatus};

use crate::validation::{
    INVALID_STRING, NON_FIELD_ERRORS, NOT_NULL, REQUIRED, ValidationError, expect_object,
};

const NAME_MAX: usize = 100;
const CONTACT_MAX: usize = 20;
const EMAIL_MAX: usize = 254;
const DIAGNOSIS_MAX: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default, serialize_with = "blank_choice", deserialize_with = "optional_choice")]
    pub stage: Option<CancerStage>,
    #[serde(default, serialize_with = "blank_choice", deserialize_with = "optional_choice")]
    pub status: Option<PatientStatus>,
    #[serde(default)]
    pub medical_history: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn new(id: i64, new: NewPatient, now: DateTime<Utc>) -> Self {
        let mut patient = Self {
            id,
            first_name: new.first_name,
            last_name: new.last_name,
            date_of_birth: new.date_of_birth,
            gender: new.gender,
            contact: String::new(),
            email: String::new(),
            diagnosis: String::new(),
            stage: None,
            status: None,
            medical_history: String::new(),
            created_at: now,
            updated_at: now,
        };
        patient.apply(new.optional, now);
        patient
    }

    /// Overwrites the fields present in `changes` and bumps `updated_at`.
    pub fn apply(&mut self, changes: PatientChanges, now: DateTime<Utc>) {
        if let Some(v) = changes.first_name {
            self.first_name = v;
        }
        if let Some(v) = changes.last_name {
            self.last_name = v;
        }
        if let Some(v) = changes.date_of_birth {
            self.date_of_birth = v;
        }
        if let Some(v) = changes.gender {
            self.gender = v;
        }
        if let Some(v) = changes.contact {
            self.contact = v;
        }
        if let Some(v) = changes.email {
            self.email = v;
        }
        if let Some(v) = changes.diagnosis {
            self.diagnosis = v;
        }
        if let Some(v) = changes.stage {
            self.stage = v;
        }
        if let Some(v) = changes.status {
            self.status = v;
        }
        if let Some(v) = changes.medical_history {
            self.medical_history = v;
        }
        self.updated_at = now;
    }

    pub fn display_name(&self) -> String {
        format!("{} {} (ID: {})", self.first_name, self.last_name, self.id)
    }
}

fn blank_choice<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<str>,
    S: Serializer,
{
    serializer.serialize_str(value.as_ref().map(|v| AsRef::<str>::as_ref(v)).unwrap_or(""))
}

fn optional_choice<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: FromStr,
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    if raw.is_empty() {
        return Ok(None);
    }
    T::from_str(&raw)
        .map(Some)
        .map_err(|_| SerdeError::custom(format!("\"{raw}\" is not a valid choice.")))
}

/// Client-writable fields, each `Some` when present in the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub diagnosis: Option<String>,
    pub stage: Option<Option<CancerStage>>,
    pub status: Option<Option<PatientStatus>>,
    pub medical_history: Option<String>,
}

/// A validated create request: required fields are guaranteed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub optional: PatientChanges,
}

impl NewPatient {
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let mut changes = PatientChanges::from_json(body, false)?;
        match (
            changes.first_name.take(),
            changes.last_name.take(),
            changes.date_of_birth.take(),
            changes.gender.take(),
        ) {
            (Some(first_name), Some(last_name), Some(date_of_birth), Some(gender)) => Ok(Self {
                first_name,
                last_name,
                date_of_birth,
                gender,
                optional: changes,
            }),
            _ => Err(ValidationError::single(NON_FIELD_ERRORS, REQUIRED)),
        }
    }
}

impl PatientChanges {
    /// With `partial` unset, the identity fields must all be present (PUT / POST).
    pub fn from_json(body: &Value, partial: bool) -> Result<Self, ValidationError> {
        let map = expect_object(body)?;
        let mut errors = ValidationError::default();
        let mut fields = FieldReader {
            map,
            partial,
            errors: &mut errors,
        };

        let changes = PatientChanges {
            first_name: fields.read("first_name", true, |v| text(v, NAME_MAX, false)),
            last_name: fields.read("last_name", true, |v| text(v, NAME_MAX, false)),
            date_of_birth: fields.read("date_of_birth", true, date),
            gender: fields.read("gender", true, |v| choice::<Gender>(v)),
            contact: fields.read("contact", false, |v| text(v, CONTACT_MAX, true)),
            email: fields.read("email", false, email),
            diagnosis: fields.read("diagnosis", false, |v| text(v, DIAGNOSIS_MAX, true)),
            stage: fields.read("stage", false, blank_or_choice::<CancerStage>),
            status: fields.read("status", false, blank_or_choice::<PatientStatus>),
            medical_history: fields.read("medical_history", false, |v| text(v, usize::MAX, true)),
        };

        errors.into_result().map(|_| changes)
    }
}

struct FieldReader<'a> {
    map: &'a Map<String, Value>,
    partial: bool,
    errors: &'a mut ValidationError,
}

impl FieldReader<'_> {
    fn read<T>(
        &mut self,
        key: &str,
        required: bool,
        parse: impl FnOnce(&Value) -> Result<T, String>,
    ) -> Option<T> {
        match self.map.get(key) {
            None => {
                if required && !self.partial {
                    self.errors.add(key, REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                self.errors.add(key, NOT_NULL);
                None
            }
            Some(value) => self.errors.collect(key, parse(value)),
        }
    }
}

fn text(value: &Value, max: usize, allow_blank: bool) -> Result<String, String> {
    let s = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(INVALID_STRING.to_string()),
    };
    if s.is_empty() && !allow_blank {
        return Err("This field may not be blank.".to_string());
    }
    if s.chars().count() > max {
        return Err(format!("Ensure this field has no more than {max} characters."));
    }
    Ok(s)
}

fn date(value: &Value) -> Result<NaiveDate, String> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .ok_or_else(|| {
            "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.".to_string()
        })
}

fn invalid_choice(value: &Value) -> String {
    let shown = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("\"{shown}\" is not a valid choice.")
}

fn choice<T: FromStr>(value: &Value) -> Result<T, String> {
    value
        .as_str()
        .and_then(|s| T::from_str(s).ok())
        .ok_or_else(|| invalid_choice(value))
}

fn blank_or_choice<T: FromStr>(value: &Value) -> Result<Option<T>, String> {
    if value.as_str() == Some("") {
        return Ok(None);
    }
    choice(value).map(Some)
}

fn email(value: &Value) -> Result<String, String> {
    let s = text(value, EMAIL_MAX, true)?;
    if s.is_empty() || looks_like_email(&s) {
        Ok(s)
    } else {
        Err("Enter a valid email address.".to_string())
    }
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !s.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
}
