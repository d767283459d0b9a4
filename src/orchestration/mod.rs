//! Drift scan orchestration
//!
//! `executor` runs per-directory check units with bounded parallelism;
//! `drifter` builds those units for the drift and workspace scans.

mod drifter;
mod executor;

pub use drifter::{Drifter, DEFAULT_CACHE_VALID_DURATION, DEFAULT_REF, VCS_TYPE};
pub use executor::{run_all, CheckUnit};
