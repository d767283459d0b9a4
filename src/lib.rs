//! atlantis-drift - Terraform drift detection through Atlantis
//!
//! Plans every project of an Atlantis repo against its default branch,
//! remembers verdicts in a staleness-gated cache and reports drift and
//! unexpected remote workspaces to pluggable notification sinks.

pub mod atlantis;
pub mod cache;
pub mod checkout;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod notification;
pub mod orchestration;
pub mod terraform;

pub use error::{DriftError, DriftResult, ErrorKind};
