pub mod models;
pub mod routes;
pub mod store;

pub use models::{NewPatient, Patient, PatientChanges};
pub use store::{PatientStore, StoreError};
