//! Typed wrappers that turn user configuration structs into engine calls.

pub mod database_client;
pub mod kms_client;

pub use database_client::DatabaseClient;
pub use kms_client::KmsClient;
