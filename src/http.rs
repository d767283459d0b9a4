//! Blocking HTTP plumbing shared by the Atlantis client and webhook sinks
//!
//! `ureq` is synchronous, so requests run on tokio's blocking pool and race
//! the run's cancellation token.

use crate::error::{DriftError, DriftResult};
use tokio_util::sync::CancellationToken;

/// Agent that hands back 4xx/5xx responses instead of erroring, so callers
/// can read the body and classify the failure themselves
pub fn agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(config)
}

/// Status code and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// POST a JSON body, returning the raw response; transport failures are
/// reported as plain strings for the caller to wrap
pub fn post_json(
    agent: &ureq::Agent,
    url: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> Result<RawResponse, String> {
    let mut request = agent.post(url).header("Content-Type", "application/json");
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    let mut response = request
        .send(body.as_bytes())
        .map_err(|e| format!("request to {} failed: {}", url, e))?;
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| format!("unable to read response body from {}: {}", url, e))?;
    Ok(RawResponse { status, body })
}

/// Run a blocking call off the async runtime, giving up when `cancel` fires
///
/// A cancelled call keeps running on the blocking pool; its result is dropped.
pub async fn run_blocking<T, F>(cancel: &CancellationToken, f: F) -> DriftResult<T>
where
    F: FnOnce() -> DriftResult<T> + Send + 'static,
    T: Send + 'static,
{
    let call = tokio::task::spawn_blocking(f);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DriftError::Cancelled),
        joined = call => joined
            .map_err(|e| DriftError::Internal(format!("blocking task failed: {}", e)))?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_blocking_returns_value() {
        let value = run_blocking(&CancellationToken::new(), || Ok(42)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn run_blocking_propagates_error() {
        let err = run_blocking::<(), _>(&CancellationToken::new(), || {
            Err(DriftError::Internal("boom".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DriftError::Internal(_)));
    }

    #[tokio::test]
    async fn run_blocking_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_blocking(&cancel, || {
            std::thread::sleep(std::time::Duration::from_millis(200));
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn post_to_unreachable_host_is_transport_error() {
        let agent = agent();
        let result = run_blocking(&CancellationToken::new(), move || {
            Ok(post_json(&agent, "http://127.0.0.1:9/api/plan", &[], "{}"))
        })
        .await
        .unwrap();
        assert!(result.is_err());
    }
}
