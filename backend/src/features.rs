//! Feature adapter: validated records → the model's column layout.

use crate::validation::FeatureRecord;

/// Survival model columns, in training order.
pub const SURVIVAL_COLUMNS: [&str; 34] = [
    "Age at Diagnosis",
    "Neoplasm Histologic Grade",
    "HER2 Status",
    "ER Status",
    "PR Status",
    "Tumor Size",
    "Tumor Stage",
    "Lymph nodes examined positive",
    "Mutation Count",
    "Nottingham prognostic index",
    "Inferred Menopausal State",
    "Overall Survival (Months)",
    "Relapse Free Status (Months)",
    "TMB (nonsynonymous)",
    "BRCA1",
    "BRCA2",
    "TP53",
    "ERBB2",
    "ESR1",
    "PGR",
    "AKT1",
    "PIK3CA",
    "MKI67",
    "CDH1",
    "BCL10",
    "CFH",
    "RBM14",
    "TAOK2",
    "DUSP11",
    "ISCU",
    "MARCHF6",
    "MOB3B",
    "DNAJB6",
    "ATG12",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    Category(&'static str),
}

/// A single labelled input row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    cells: Vec<(&'static str, FeatureValue)>,
}

impl FeatureRow {
    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.cells.iter().map(|(c, _)| *c)
    }

    pub fn get(&self, column: &str) -> Option<FeatureValue> {
        self.cells
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| *v)
    }
}

impl FromIterator<(&'static str, FeatureValue)> for FeatureRow {
    fn from_iter<I: IntoIterator<Item = (&'static str, FeatureValue)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Missing feature in request data: '{0}'")]
pub struct MissingFeatureError(pub String);

/// `"Overall Survival (Months)"` → `"overall_survival_months"`.
pub fn column_key(column: &str) -> String {
    column
        .to_lowercase()
        .replace(' ', "_")
        .replace(['(', ')'], "")
}

/// Builds the row straight from the record's static column table.
pub fn from_record<R: FeatureRecord>(record: &R) -> Result<FeatureRow, MissingFeatureError> {
    R::COLUMNS
        .iter()
        .map(|&(key, column)| {
            record
                .feature(key)
                .map(|value| (column, value))
                .ok_or_else(|| MissingFeatureError(key.to_string()))
        })
        .collect()
}

/// Builds the row for an externally fixed column list, resolving each column
/// through [`column_key`].
pub fn from_columns<R: FeatureRecord>(
    record: &R,
    columns: &[&'static str],
) -> Result<FeatureRow, MissingFeatureError> {
    columns
        .iter()
        .map(|&column| {
            let key = column_key(column);
            match record.feature(&key) {
                Some(value) => Ok((column, value)),
                None => Err(MissingFeatureError(key)),
            }
        })
        .collect()
}
