pub mod config;
pub mod error;
pub mod features;
pub mod imaging;
pub mod inference;
pub mod models;
pub mod patients;
pub mod routes;
pub mod validation;
