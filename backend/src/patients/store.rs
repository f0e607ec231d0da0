use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;

use super::models::{NewPatient, Patient, PatientChanges};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Patient>,
}

/// Patient table kept in memory, optionally mirrored to a JSON snapshot that
/// is rewritten after every mutation. A mutation whose snapshot write fails
/// is rolled back.
pub struct PatientStore {
    table: RwLock<Table>,
    snapshot: Option<PathBuf>,
}

impl PatientStore {
    pub fn in_memory() -> Self {
        Self {
            table: RwLock::new(Table {
                next_id: 1,
                rows: BTreeMap::new(),
            }),
            snapshot: None,
        }
    }

    /// Opens the store, loading `snapshot` when it already exists.
    pub fn open(snapshot: Option<PathBuf>) -> Result<Self, StoreError> {
        let Some(path) = snapshot else {
            return Ok(Self::in_memory());
        };

        let rows: BTreeMap<i64, Patient> = if path.exists() {
            let bytes = std::fs::read(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let patients: Vec<Patient> = serde_json::from_slice(&bytes)?;
            patients.into_iter().map(|p| (p.id, p)).collect()
        } else {
            BTreeMap::new()
        };
        let next_id = rows.keys().next_back().map_or(1, |id| id + 1);
        log::info!(
            "Patient store at {} opened with {} record(s)",
            path.display(),
            rows.len()
        );

        Ok(Self {
            table: RwLock::new(Table { next_id, rows }),
            snapshot: Some(path),
        })
    }

    /// Newest first.
    pub async fn list(&self) -> Vec<Patient> {
        let table = self.table.read().await;
        let mut patients: Vec<Patient> = table.rows.values().cloned().collect();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        patients
    }

    pub async fn get(&self, id: i64) -> Option<Patient> {
        self.table.read().await.rows.get(&id).cloned()
    }

    pub async fn create(&self, new: NewPatient) -> Result<Patient, StoreError> {
        let mut table = self.table.write().await;
        let id = table.next_id;
        let patient = Patient::new(id, new, Utc::now());
        table.rows.insert(id, patient.clone());
        if let Err(e) = self.persist(&table) {
            table.rows.remove(&id);
            return Err(e);
        }
        table.next_id += 1;
        Ok(patient)
    }

    /// `Ok(None)` when no patient has this id.
    pub async fn update(
        &self,
        id: i64,
        changes: PatientChanges,
    ) -> Result<Option<Patient>, StoreError> {
        let mut table = self.table.write().await;
        let Some(patient) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        let previous = patient.clone();
        patient.apply(changes, Utc::now());
        let updated = patient.clone();
        if let Err(e) = self.persist(&table) {
            table.rows.insert(id, previous);
            return Err(e);
        }
        Ok(Some(updated))
    }

    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut table = self.table.write().await;
        let Some(removed) = table.rows.remove(&id) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&table) {
            table.rows.insert(id, removed);
            return Err(e);
        }
        Ok(true)
    }

    fn persist(&self, table: &Table) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let patients: Vec<&Patient> = table.rows.values().collect();
        let bytes = serde_json::to_vec_pretty(&patients)?;
        write_atomically(path, &bytes)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}
