//! Tree-ensemble classifier loaded from a JSON artifact.
//!
//! Trees use the XGBoost node-array layout: node `i` is a leaf when
//! `left_children[i] == -1`, in which case `split_conditions[i]` holds the
//! leaf value. A sample goes left when `value < split_condition`.
//!
//! ```json
//! {
//!   "feature_names": ["Age at Diagnosis", "HER2 Status", ...],
//!   "categories": { "HER2 Status": ["Negative", "Positive"] },
//!   "outputs": [
//!     { "name": "Chemotherapy", "objective": "binary:logistic", "base_score": 0.5,
//!       "trees": [ { "left_children": [1, -1, -1], "right_children": [2, -1, -1],
//!                    "split_indices": [0, 0, 0], "split_conditions": [55.0, -0.4, 0.3],
//!                    "default_left": [1, 0, 0] } ] }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{InferenceError, ModelLoadError, TabularModel, read_artifact};
use crate::features::{FeatureRow, FeatureValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Boosted margins, `p = sigmoid(logit(base_score) + Σ leaf)`.
    Logistic,
    /// Random-forest style, `p = mean(leaf)`.
    Mean,
}

impl Objective {
    fn parse(name: &str) -> Result<Self, ModelLoadError> {
        match name {
            "binary:logistic" => Ok(Objective::Logistic),
            "binary:mean" => Ok(Objective::Mean),
            other => Err(ModelLoadError::UnsupportedObjective(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArtifactJson {
    feature_names: Vec<String>,
    #[serde(default)]
    categories: HashMap<String, Vec<String>>,
    outputs: Vec<OutputJson>,
}

#[derive(Debug, Deserialize)]
struct OutputJson {
    #[serde(default)]
    name: Option<String>,
    objective: String,
    #[serde(default = "default_base_score")]
    base_score: f32,
    trees: Vec<Tree>,
}

fn default_base_score() -> f32 {
    0.5
}

/// Accepts `true`/`false` as well as `1`/`0` per entry.
fn deserialize_flags<'de, D>(deserializer: D) -> Result<Vec<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    let values = Vec::<Value>::deserialize(deserializer)?;
    values
        .into_iter()
        .map(|v| match v {
            Value::Bool(b) => Ok(b),
            Value::Number(n) => n
                .as_i64()
                .map(|i| i != 0)
                .ok_or_else(|| SerdeError::custom("invalid number for flag")),
            _ => Err(SerdeError::custom("flag must be bool or 0/1")),
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    #[serde(default, deserialize_with = "deserialize_flags")]
    default_left: Vec<bool>,
}

impl Tree {
    fn n_nodes(&self) -> usize {
        self.left_children.len()
    }

    fn is_leaf(&self, node: usize) -> bool {
        self.left_children[node] == -1
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        let n = self.n_nodes();
        if n == 0 {
            return Err("tree has no nodes".into());
        }
        if self.right_children.len() != n
            || self.split_indices.len() != n
            || self.split_conditions.len() != n
            || (!self.default_left.is_empty() && self.default_left.len() != n)
        {
            return Err("node arrays have different lengths".into());
        }
        for node in 0..n {
            if self.is_leaf(node) {
                continue;
            }
            for child in [self.left_children[node], self.right_children[node]] {
                // Children always come after their parent; this also rules out cycles.
                if child <= node as i32 || child as usize >= n {
                    return Err(format!("node {node} references invalid child {child}"));
                }
            }
            if self.split_indices[node] as usize >= n_features {
                return Err(format!(
                    "node {node} splits on feature {} but the model has {n_features}",
                    self.split_indices[node]
                ));
            }
        }
        Ok(())
    }

    fn leaf_value(&self, features: &[f32]) -> f32 {
        let mut node = 0usize;
        while !self.is_leaf(node) {
            let value = features[self.split_indices[node] as usize];
            let go_left = if value.is_nan() {
                self.default_left.get(node).copied().unwrap_or(false)
            } else {
                value < self.split_conditions[node]
            };
            let next = if go_left {
                self.left_children[node]
            } else {
                self.right_children[node]
            };
            node = next as usize;
        }
        self.split_conditions[node]
    }
}

#[derive(Debug, Clone)]
struct Output {
    name: Option<String>,
    objective: Objective,
    base_score: f32,
    trees: Vec<Tree>,
}

impl Output {
    fn probability(&self, features: &[f32]) -> f64 {
        match self.objective {
            Objective::Logistic => {
                let p = f64::from(self.base_score).clamp(1e-7, 1.0 - 1e-7);
                let margin = (p / (1.0 - p)).ln()
                    + self
                        .trees
                        .iter()
                        .map(|t| f64::from(t.leaf_value(features)))
                        .sum::<f64>();
                1.0 / (1.0 + (-margin).exp())
            }
            Objective::Mean => {
                if self.trees.is_empty() {
                    return f64::from(self.base_score);
                }
                let total: f64 = self
                    .trees
                    .iter()
                    .map(|t| f64::from(t.leaf_value(features)))
                    .sum();
                total / self.trees.len() as f64
            }
        }
    }
}

/// Binary classifier with one or more independent outputs.
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    feature_names: Vec<String>,
    categories: HashMap<String, Vec<String>>,
    outputs: Vec<Output>,
}

impl TreeEnsemble {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let bytes = read_artifact(path)?;
        let model = Self::from_slice(&bytes)?;
        log::debug!(
            "{} holds {} output(s) {:?} over {} feature(s)",
            path.display(),
            model.outputs.len(),
            model.output_names().collect::<Vec<_>>(),
            model.feature_names.len()
        );
        Ok(model)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModelLoadError> {
        let artifact: ArtifactJson =
            serde_json::from_slice(bytes).map_err(|e| ModelLoadError::Malformed(e.to_string()))?;
        Self::from_artifact(artifact)
    }

    fn from_artifact(artifact: ArtifactJson) -> Result<Self, ModelLoadError> {
        let n_features = artifact.feature_names.len();
        if n_features == 0 {
            return Err(ModelLoadError::Malformed("feature_names is empty".into()));
        }
        if artifact.outputs.is_empty() {
            return Err(ModelLoadError::Malformed("model has no outputs".into()));
        }
        if let Some(column) = artifact
            .categories
            .keys()
            .find(|c| !artifact.feature_names.contains(c))
        {
            return Err(ModelLoadError::Malformed(format!(
                "categories given for unknown column '{column}'"
            )));
        }

        let mut outputs = Vec::with_capacity(artifact.outputs.len());
        for (i, out) in artifact.outputs.into_iter().enumerate() {
            let objective = Objective::parse(&out.objective)?;
            for (t, tree) in out.trees.iter().enumerate() {
                tree.validate(n_features).map_err(|e| {
                    ModelLoadError::Malformed(format!("output {i}, tree {t}: {e}"))
                })?;
            }
            outputs.push(Output {
                name: out.name,
                objective,
                base_score: out.base_score,
                trees: out.trees,
            });
        }

        Ok(Self {
            feature_names: artifact.feature_names,
            categories: artifact.categories,
            outputs,
        })
    }

    fn output_names(&self) -> impl Iterator<Item = Option<&str>> {
        self.outputs.iter().map(|o| o.name.as_deref())
    }

    /// Lays `row` out in training order, ordinal-encoding categorical columns.
    fn encode(&self, row: &FeatureRow) -> Result<Vec<f32>, InferenceError> {
        if row.len() != self.feature_names.len() {
            return Err(InferenceError::ShapeMismatch {
                expected: self.feature_names.len(),
                got: row.len(),
            });
        }

        self.feature_names
            .iter()
            .map(|column| {
                let value = row
                    .get(column)
                    .ok_or_else(|| InferenceError::UnknownColumn(column.clone()))?;
                match (value, self.categories.get(column)) {
                    (FeatureValue::Number(n), None) => Ok(n as f32),
                    (FeatureValue::Category(label), Some(levels)) => levels
                        .iter()
                        .position(|l| l == label)
                        .map(|code| code as f32)
                        .ok_or_else(|| InferenceError::UnsupportedValue {
                            column: column.clone(),
                            value: label.to_string(),
                        }),
                    (FeatureValue::Number(n), Some(_)) => Err(InferenceError::UnsupportedValue {
                        column: column.clone(),
                        value: n.to_string(),
                    }),
                    (FeatureValue::Category(label), None) => {
                        Err(InferenceError::UnsupportedValue {
                            column: column.clone(),
                            value: label.to_string(),
                        })
                    }
                }
            })
            .collect()
    }
}

impl TabularModel for TreeEnsemble {
    fn predict(&self, row: &FeatureRow) -> Result<Vec<i64>, InferenceError> {
        let features = self.encode(row)?;
        Ok(self
            .outputs
            .iter()
            .map(|o| i64::from(o.probability(&features) >= 0.5))
            .collect())
    }

    fn predict_proba(&self, row: &FeatureRow) -> Result<Vec<f64>, InferenceError> {
        let features = self.encode(row)?;
        let output = self
            .outputs
            .first()
            .ok_or_else(|| InferenceError::Model("model has no outputs".into()))?;
        let p = output.probability(&features);
        Ok(vec![1.0 - p, p])
    }
}
