//! Atlantis API client for speculative plans

use crate::error::{DriftError, DriftResult, ErrorKind};
use crate::http;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Header Atlantis checks against its API secret
const TOKEN_HEADER: &str = "X-Atlantis-Token";

/// Failure text Atlantis reports for a project held by another PR's lock
const LOCKED_FAILURE: &str = "This project is currently locked ";

/// Summary prefix of a plan without changes
const NO_CHANGES: &str = "No changes.";

/// Parameters of one plan request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummaryRequest {
    pub repo: String,
    pub git_ref: String,
    pub vcs_type: String,
    pub dir: String,
    pub workspace: String,
}

/// Verdict for one project of a plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    /// Planning was blocked by a lock
    pub has_lock: bool,
    /// Summary line of the plan output
    pub summary: String,
}

impl PlanSummary {
    pub fn locked() -> Self {
        Self {
            has_lock: true,
            summary: String::new(),
        }
    }

    pub fn planned(summary: impl Into<String>) -> Self {
        Self {
            has_lock: false,
            summary: summary.into(),
        }
    }
}

/// All project summaries returned for a plan request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanResult {
    pub summaries: Vec<PlanSummary>,
}

impl PlanResult {
    pub fn new(summaries: Vec<PlanSummary>) -> Self {
        Self { summaries }
    }

    /// True if any unlocked project plans changes
    pub fn has_changes(&self) -> bool {
        self.summaries
            .iter()
            .filter(|s| !s.has_lock)
            .any(|s| !s.summary.trim_start().starts_with(NO_CHANGES))
    }

    /// True if every project was blocked by a lock
    ///
    /// A result without summaries is not locked: nothing was blocked.
    pub fn is_locked(&self) -> bool {
        !self.summaries.is_empty() && self.summaries.iter().all(|s| s.has_lock)
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

/// Remote planning service
#[async_trait]
pub trait PlanClient: Send + Sync {
    /// Run a speculative plan and summarize it
    async fn plan_summary(
        &self,
        cancel: &CancellationToken,
        req: &PlanSummaryRequest,
    ) -> DriftResult<PlanResult>;
}

/// Body of `POST /api/plan`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ApiRequest<'a> {
    repository: &'a str,
    #[serde(rename = "Ref")]
    git_ref: &'a str,
    #[serde(rename = "Type")]
    vcs_type: &'a str,
    paths: Vec<ApiPath<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ApiPath<'a> {
    directory: &'a str,
    workspace: &'a str,
}

impl<'a> From<&'a PlanSummaryRequest> for ApiRequest<'a> {
    fn from(req: &'a PlanSummaryRequest) -> Self {
        Self {
            repository: &req.repo,
            git_ref: &req.git_ref,
            vcs_type: &req.vcs_type,
            paths: vec![ApiPath {
                directory: &req.dir,
                workspace: &req.workspace,
            }],
        }
    }
}

/// Command result as serialized by Atlantis
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ApiResult {
    error: Option<serde_json::Value>,
    failure: String,
    project_results: Option<Vec<ApiProjectResult>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ApiProjectResult {
    failure: String,
    plan_success: Option<ApiPlanSuccess>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ApiPlanSuccess {
    terraform_output: String,
}

/// Extract the `Plan: ...` or `No changes. ...` line from terraform output
pub fn summary_from_output(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Plan:") || line.starts_with(NO_CHANGES))
        .unwrap_or_default()
        .to_string()
}

/// Turn a raw `/api/plan` response into a verdict or a classified error
pub fn interpret_plan_response(url: &str, status: u16, body: &str) -> DriftResult<PlanResult> {
    match status {
        401 => {
            let message = body.trim();
            return Err(DriftError::Unauthorized(if message.is_empty() {
                "unauthorized".to_string()
            } else {
                message.to_string()
            }));
        }
        404 => {
            return Err(DriftError::plan(
                ErrorKind::NotFound,
                format!("{} not found: {}", url, body.trim()),
            ))
        }
        _ => {}
    }

    let decoded: ApiResult = match serde_json::from_str(body) {
        Ok(decoded) => decoded,
        Err(e) => {
            // An overloaded server answers 5xx with non-JSON pages
            let kind = if status == 500 || status == 503 {
                ErrorKind::Temporary
            } else {
                ErrorKind::Permanent
            };
            return Err(DriftError::plan(
                kind,
                format!(
                    "error decoding plan response(code:{})(body:{}): {}",
                    status, body, e
                ),
            ));
        }
    };

    if status != 200 && status != 500 {
        return Err(DriftError::plan(
            ErrorKind::Permanent,
            format!("non-200 and non-500 response for {}: {}", url, status),
        ));
    }
    if let Some(error) = decoded.error.filter(|e| !e.is_null()) {
        return Err(DriftError::plan(
            ErrorKind::Permanent,
            format!("error making plan request: {}", error),
        ));
    }
    if !decoded.failure.is_empty() {
        return Err(DriftError::plan(
            ErrorKind::Permanent,
            format!("failure making plan request: {}", decoded.failure),
        ));
    }

    let mut summaries = Vec::new();
    for result in decoded.project_results.unwrap_or_default() {
        if result.failure.contains(LOCKED_FAILURE) {
            summaries.push(PlanSummary::locked());
            continue;
        }
        if let Some(success) = result.plan_success {
            summaries.push(PlanSummary::planned(summary_from_output(
                &success.terraform_output,
            )));
            continue;
        }
        return Err(DriftError::plan(
            ErrorKind::Permanent,
            format!("project result unknown failure: {}", result.failure),
        ));
    }
    Ok(PlanResult::new(summaries))
}

/// Client for an Atlantis server's API
#[derive(Clone)]
pub struct AtlantisClient {
    hostname: String,
    token: String,
    agent: ureq::Agent,
}

impl AtlantisClient {
    /// Create a client for `hostname` (scheme included) authenticating with `token`
    pub fn new(hostname: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            token: token.into(),
            agent: http::agent(),
        }
    }

    fn plan_url(&self) -> String {
        format!("{}/api/plan", self.hostname.trim_end_matches('/'))
    }
}

#[async_trait]
impl PlanClient for AtlantisClient {
    async fn plan_summary(
        &self,
        cancel: &CancellationToken,
        req: &PlanSummaryRequest,
    ) -> DriftResult<PlanResult> {
        let url = self.plan_url();
        let body = serde_json::to_string(&ApiRequest::from(req))?;
        debug!(dir = %req.dir, workspace = %req.workspace, "Requesting plan from {}", url);

        let agent = self.agent.clone();
        let token = self.token.clone();
        let target = url.clone();
        let response = http::run_blocking(cancel, move || {
            http::post_json(&agent, &target, &[(TOKEN_HEADER, token.as_str())], &body).map_err(|e| {
                DriftError::plan(
                    ErrorKind::Permanent,
                    format!("error making plan request: {}", e),
                )
            })
        })
        .await?;

        interpret_plan_response(&url, response.status, &response.body)
    }
}
