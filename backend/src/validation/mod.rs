//! Schema validation of incoming request bodies.
//!
//! Every field is checked independently and all failures are reported
//! together, keyed by the external field name.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};
use shared::{MenopausalState, ReceptorStatus};
use strum::IntoEnumIterator;

use crate::features::FeatureValue;

pub const REQUIRED: &str = "This field is required.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const INVALID_NUMBER: &str = "A valid number is required.";
pub const INVALID_INTEGER: &str = "A valid integer is required.";
pub const INVALID_STRING: &str = "Not a valid string.";
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Field name → every constraint the submitted value violated.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(transparent)]
#[error("{} field(s) failed validation", .fields.len())]
pub struct ValidationError {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut err = Self::default();
        err.add(field, message);
        err
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Records the error side of `result` under `field` and hands back the value.
    pub fn collect<T>(&mut self, field: &str, result: Result<T, String>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(message) => {
                self.add(field, message);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn messages(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Conversion of one raw JSON value into a typed field.
pub trait FieldKind: Sized {
    /// `column` is the model-facing label, used in enumerated-value messages.
    fn parse(value: &Value, column: &str) -> Result<Self, String>;

    fn to_feature(&self) -> FeatureValue;
}

impl FieldKind for f64 {
    fn parse(value: &Value, _column: &str) -> Result<Self, String> {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .filter(|v| v.is_finite())
            .ok_or_else(|| INVALID_NUMBER.to_string())
    }

    fn to_feature(&self) -> FeatureValue {
        FeatureValue::Number(*self)
    }
}

impl FieldKind for i64 {
    fn parse(value: &Value, _column: &str) -> Result<Self, String> {
        let parsed = match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
            Value::String(s) => parse_integer_str(s),
            _ => None,
        };
        parsed.ok_or_else(|| INVALID_INTEGER.to_string())
    }

    fn to_feature(&self) -> FeatureValue {
        FeatureValue::Number(*self as f64)
    }
}

impl FieldKind for ReceptorStatus {
    fn parse(value: &Value, column: &str) -> Result<Self, String> {
        parse_choice(value, column)
    }

    fn to_feature(&self) -> FeatureValue {
        FeatureValue::Category((*self).into())
    }
}

impl FieldKind for MenopausalState {
    fn parse(value: &Value, column: &str) -> Result<Self, String> {
        parse_choice(value, column)
    }

    fn to_feature(&self) -> FeatureValue {
        FeatureValue::Category((*self).into())
    }
}

fn integral(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Accepts `"12"` as well as `"12.0"` / `"12.00"`, like the numeric widgets
/// of most form clients send.
fn parse_integer_str(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    let digits = match trimmed.split_once('.') {
        Some((whole, zeros)) if zeros.chars().all(|c| c == '0') => whole,
        Some(_) => return None,
        None => trimmed,
    };
    digits.parse::<i64>().ok()
}

/// Exact, case-sensitive match against the enumeration's literal values.
pub fn parse_choice<T>(value: &Value, column: &str) -> Result<T, String>
where
    T: FromStr + IntoEnumIterator + AsRef<str>,
{
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(INVALID_STRING.to_string()),
    };
    T::from_str(&raw).map_err(|_| {
        let allowed: Vec<String> = T::iter().map(|v| format!("'{}'", v.as_ref())).collect();
        format!("{} must be {}.", column, allowed.join(" or "))
    })
}

pub fn expect_object(body: &Value) -> Result<&Map<String, Value>, ValidationError> {
    body.as_object().ok_or_else(|| {
        ValidationError::single(
            NON_FIELD_ERRORS,
            format!(
                "Invalid data. Expected a dictionary, but got {}.",
                json_type_name(body)
            ),
        )
    })
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

pub fn required_field<T: FieldKind>(
    body: &Map<String, Value>,
    key: &str,
    column: &str,
) -> Result<T, String> {
    match body.get(key) {
        None => Err(REQUIRED.to_string()),
        Some(Value::Null) => Err(NOT_NULL.to_string()),
        Some(value) => T::parse(value, column),
    }
}

/// A validated, strongly typed request whose fields map one-to-one onto
/// model columns.
pub trait FeatureRecord: Sized {
    /// `(external key, model column)` in the order the model was trained on.
    const COLUMNS: &'static [(&'static str, &'static str)];

    fn from_json(body: &Value) -> Result<Self, ValidationError>;

    /// Value for an external key, `None` when the record has no such field.
    fn feature(&self, key: &str) -> Option<FeatureValue>;
}

/// Declares a typed request record together with its column table and
/// its all-errors validator.
macro_rules! feature_record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $field:ident : $ty:ty => $column:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $( pub $field: $ty, )+
        }

        impl $crate::validation::FeatureRecord for $name {
            const COLUMNS: &'static [(&'static str, &'static str)] =
                &[ $( (stringify!($field), $column) ),+ ];

            fn from_json(
                body: &::serde_json::Value,
            ) -> Result<Self, $crate::validation::ValidationError> {
                let map = $crate::validation::expect_object(body)?;
                let mut errors = $crate::validation::ValidationError::default();
                $(
                    let $field = errors.collect(
                        stringify!($field),
                        $crate::validation::required_field::<$ty>(map, stringify!($field), $column),
                    );
                )+
                match ( $( $field, )+ ) {
                    ( $( Some($field), )+ ) => Ok(Self { $( $field, )+ }),
                    _ => Err(errors),
                }
            }

            fn feature(&self, key: &str) -> Option<$crate::features::FeatureValue> {
                match key {
                    $(
                        stringify!($field) => Some(
                            $crate::validation::FieldKind::to_feature(&self.$field),
                        ),
                    )+
                    _ => None,
                }
            }
        }
    };
}

pub(crate) use feature_record;

pub mod records;
