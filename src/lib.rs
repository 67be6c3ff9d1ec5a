//! Event-triggered Cloud SQL backups.
//!
//! A [`handler::BackupHandler`] takes one event naming an instance, starts a
//! backup run, checks it, retries with exponential backoff and publishes an
//! alert to Pub/Sub when every attempt failed.

pub mod alert;
pub mod config;
pub mod dry_run;
pub mod error;
pub mod gcp;
pub mod handler;
pub mod logging;
pub mod retry;
pub mod types;
