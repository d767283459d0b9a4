//! Atlantis integration
//!
//! - `client`: the `/api/plan` endpoint, reduced to a has-changes/is-locked verdict
//! - `config`: `atlantis.yaml` parsing into directories and their workspaces

pub mod client;
pub mod config;

pub use client::{AtlantisClient, PlanClient, PlanResult, PlanSummary, PlanSummaryRequest};
pub use config::{DirectoriesWithWorkspaces, Project, RepoConfig, ATLANTIS_YAML_FILENAME};
