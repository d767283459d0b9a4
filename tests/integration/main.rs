//! Integration tests for atlantis-drift

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    const SCRUBBED: &[&str] = &[
        "REPO",
        "ATLANTIS_HOST",
        "ATLANTIS_TOKEN",
        "ATLANTIS_REF",
        "DIRECTORY_WHITELIST",
        "SLACK_WEBHOOK_URL",
        "CACHE_TABLE",
        "CACHE_DIR",
        "GITHUB_TOKEN",
        "LOG_FORMAT",
    ];

    /// Binary with a private config path and no inherited settings
    fn drift(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("atlantis-drift");
        for var in SCRUBBED {
            cmd.env_remove(var);
        }
        cmd.env("ATLANTIS_DRIFT_CONFIG", temp.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        drift(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Detect drifted and unmanaged terraform workspaces"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        drift(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("atlantis-drift"));
    }

    #[test]
    fn run_requires_repo() {
        let temp = TempDir::new().unwrap();
        drift(&temp)
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("repo is required"));
    }

    #[test]
    fn run_rejects_host_without_scheme() {
        let temp = TempDir::new().unwrap();
        drift(&temp)
            .args([
                "run",
                "--repo",
                "acme/infra",
                "--atlantis-host",
                "atlantis.example.com",
                "--atlantis-token",
                "s3cr3t",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("http:// or https://"));
    }

    #[test]
    fn run_reports_invalid_config_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[scan]\nparallel_runs = \"many\"\n")
            .unwrap();
        drift(&temp)
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration at"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        drift(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_redacts_secrets() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            "[atlantis]\nhost = \"https://atlantis.example.com\"\ntoken = \"s3cr3t\"\n",
        )
        .unwrap();
        drift(&temp)
            .args(["config", "show", "--repo", "acme/infra"])
            .assert()
            .success()
            .stdout(predicate::str::contains("token = \"***\""))
            .stdout(predicate::str::contains("name = \"acme/infra\""))
            .stdout(predicate::str::contains("s3cr3t").not());
    }

    #[test]
    fn cache_list_empty() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        drift(&temp)
            .args(["cache", "--table", "drift", "--cache-dir"])
            .arg(&cache_dir)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached results."));
    }

    #[test]
    fn cache_clear_empty() {
        let temp = TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        drift(&temp)
            .args(["cache", "--table", "drift", "--cache-dir"])
            .arg(&cache_dir)
            .args(["clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached results to clear."));
    }

    #[test]
    fn cache_requires_table() {
        let temp = TempDir::new().unwrap();
        drift(&temp)
            .args(["cache", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no cache table configured"));
    }

    #[test]
    fn unknown_command_fails() {
        let temp = TempDir::new().unwrap();
        drift(&temp).arg("plan").assert().failure();
    }
}

mod scan_tests {
    use async_trait::async_trait;
    use atlantis_drift::atlantis::{PlanClient, PlanResult, PlanSummary, PlanSummaryRequest};
    use atlantis_drift::cache::{FileStore, KeyValueStore, KeyedCache};
    use atlantis_drift::notification::Notification;
    use atlantis_drift::orchestration::Drifter;
    use atlantis_drift::terraform::WorkspaceClient;
    use atlantis_drift::DriftResult;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const ATLANTIS_YAML: &str = "\
version: 3
projects:
- dir: env/a
  workspace: prod
- dir: env/a
  workspace: staging
- dir: ./env/b/
";

    /// Plans env/a#prod as drifted, everything else clean
    #[derive(Default)]
    struct Plans {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlanClient for Plans {
        async fn plan_summary(
            &self,
            _cancel: &CancellationToken,
            req: &PlanSummaryRequest,
        ) -> DriftResult<PlanResult> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}#{}", req.dir, req.workspace));
            let summary = if req.dir == "env/a" && req.workspace == "prod" {
                "Plan: 1 to add, 0 to change, 0 to destroy."
            } else {
                "No changes. Your infrastructure matches the configuration."
            };
            Ok(PlanResult::new(vec![PlanSummary::planned(summary)]))
        }
    }

    /// Backend where env/b also holds a `scratch` workspace
    #[derive(Default)]
    struct Workspaces {
        inits: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WorkspaceClient for Workspaces {
        async fn init(&self, _cancel: &CancellationToken, dir: &str) -> DriftResult<()> {
            self.inits.lock().unwrap().push(dir.to_string());
            Ok(())
        }

        async fn list_workspaces(
            &self,
            _cancel: &CancellationToken,
            dir: &str,
        ) -> DriftResult<Vec<String>> {
            Ok(match dir {
                "env/a" => vec!["default".into(), "prod".into(), "staging".into()],
                _ => vec!["default".into(), "scratch".into()],
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn record(&self, kind: &str, dir: &str, workspace: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{} {}#{}", kind, dir, workspace));
        }
    }

    #[async_trait]
    impl Notification for Recorder {
        async fn extra_workspace_in_remote(
            &self,
            _cancel: &CancellationToken,
            dir: &str,
            workspace: &str,
        ) -> DriftResult<()> {
            self.record("extra", dir, workspace);
            Ok(())
        }

        async fn missing_workspace_in_remote(
            &self,
            _cancel: &CancellationToken,
            dir: &str,
            workspace: &str,
        ) -> DriftResult<()> {
            self.record("missing", dir, workspace);
            Ok(())
        }

        async fn plan_drift(
            &self,
            _cancel: &CancellationToken,
            dir: &str,
            workspace: &str,
        ) -> DriftResult<()> {
            self.record("drift", dir, workspace);
            Ok(())
        }
    }

    struct Run {
        plans: Arc<Plans>,
        workspaces: Arc<Workspaces>,
        recorder: Arc<Recorder>,
    }

    async fn run_once(checkout: &Path, cache_dir: &Path, parallel_runs: usize) -> Run {
        let plans = Arc::new(Plans::default());
        let workspaces = Arc::new(Workspaces::default());
        let recorder = Arc::new(Recorder::default());
        let cache = KeyedCache::new(FileStore::open(cache_dir, "drift").await.unwrap());

        Drifter::new("acme/infra", plans.clone(), workspaces.clone(), recorder.clone())
            .with_cache(Arc::new(cache))
            .with_parallel_runs(parallel_runs)
            .drift(&CancellationToken::new(), checkout)
            .await
            .unwrap();

        Run {
            plans,
            workspaces,
            recorder,
        }
    }

    fn checkout() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("atlantis.yaml"), ATLANTIS_YAML).unwrap();
        temp
    }

    #[tokio::test]
    async fn full_scan_reports_drift_and_extra_workspaces() {
        let repo = checkout();
        let cache_dir = TempDir::new().unwrap();

        let run = run_once(repo.path(), cache_dir.path(), 1).await;

        assert_eq!(
            *run.plans.calls.lock().unwrap(),
            vec!["env/a#prod", "env/a#staging", "env/b#default"]
        );
        assert_eq!(*run.workspaces.inits.lock().unwrap(), vec!["env/a", "env/b"]);
        assert_eq!(
            run.recorder.events(),
            vec!["drift env/a#prod", "extra env/b#scratch"]
        );
    }

    #[tokio::test]
    async fn second_run_is_served_from_cache() {
        let repo = checkout();
        let cache_dir = TempDir::new().unwrap();

        run_once(repo.path(), cache_dir.path(), 2).await;
        let store = FileStore::open(cache_dir.path(), "drift").await.unwrap();
        assert_eq!(store.entries().await.unwrap().len(), 5);

        let second = run_once(repo.path(), cache_dir.path(), 2).await;
        assert!(second.plans.calls.lock().unwrap().is_empty());
        assert!(second.workspaces.inits.lock().unwrap().is_empty());
        assert!(second.recorder.events().is_empty());
    }

    #[tokio::test]
    async fn missing_repo_config_fails() {
        let empty = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();
        let cache = KeyedCache::new(FileStore::open(cache_dir.path(), "drift").await.unwrap());

        let err = Drifter::new(
            "acme/infra",
            Arc::new(Plans::default()),
            Arc::new(Workspaces::default()),
            Arc::new(Recorder::default()),
        )
        .with_cache(Arc::new(cache))
        .drift(&CancellationToken::new(), empty.path())
        .await
        .unwrap_err();

        assert!(err.to_string().contains("failed to parse repo config"));
    }
}

/// One-shot HTTP server standing in for remote endpoints
mod support {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Answer a single request, handing back its headers and body
    pub fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<(String, String)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);

            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
                head.push_str(&line.to_ascii_lowercase());
            }
            let mut request_body = vec![0; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let mut stream = reader.into_inner();
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();

            (head, String::from_utf8(request_body).unwrap())
        });

        (host, handle)
    }
}

mod atlantis_tests {
    use super::support::serve_once;
    use atlantis_drift::atlantis::{AtlantisClient, PlanClient, PlanSummaryRequest};
    use atlantis_drift::DriftError;
    use tokio_util::sync::CancellationToken;

    fn request() -> PlanSummaryRequest {
        PlanSummaryRequest {
            repo: "acme/infra".into(),
            git_ref: "master".into(),
            vcs_type: "Github".into(),
            dir: "env/a".into(),
            workspace: "prod".into(),
        }
    }

    #[tokio::test]
    async fn plan_request_round_trip() {
        let (host, server) = serve_once(
            "200 OK",
            r#"{"Error":null,"Failure":"","ProjectResults":[{"Error":null,"Failure":"","PlanSuccess":{"TerraformOutput":"Refreshing...\nPlan: 2 to add, 0 to change, 0 to destroy.\n"}}]}"#,
        );
        let client = AtlantisClient::new(host, "s3cr3t");

        let result = client
            .plan_summary(&CancellationToken::new(), &request())
            .await
            .unwrap();
        assert!(result.has_changes());
        assert!(!result.is_locked());

        let (head, body) = server.join().unwrap();
        assert!(head.starts_with("post /api/plan "));
        assert!(head.contains("x-atlantis-token: s3cr3t"));
        assert!(body.contains(r#""Repository":"acme/infra""#));
        assert!(body.contains(r#""Paths":[{"Directory":"env/a","Workspace":"prod"}]"#));
    }

    #[tokio::test]
    async fn rejected_token_is_unauthorized() {
        let (host, server) = serve_once("401 Unauthorized", "bad token");
        let client = AtlantisClient::new(host, "wrong");

        let err = client
            .plan_summary(&CancellationToken::new(), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, DriftError::Unauthorized(_)));
        server.join().unwrap();
    }

    #[tokio::test]
    async fn overloaded_server_is_temporary() {
        let (host, server) = serve_once("503 Service Unavailable", "<html>busy</html>");
        let client = AtlantisClient::new(host, "s3cr3t");

        let err = client
            .plan_summary(&CancellationToken::new(), &request())
            .await
            .unwrap_err();
        assert!(err.is_temporary());
        server.join().unwrap();
    }
}

mod slack_tests {
    use super::support::serve_once;
    use atlantis_drift::notification::{Notification, SlackWebhook};
    use atlantis_drift::DriftError;
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn drift_is_posted_as_text() {
        let (host, server) = serve_once("200 OK", "ok");
        let slack = SlackWebhook::new(&format!("{}/services/T000/B000/XXXX", host)).unwrap();

        slack
            .plan_drift(&CancellationToken::new(), "env/a", "prod")
            .await
            .unwrap();

        let (head, body) = server.join().unwrap();
        assert!(head.starts_with("post /services/t000/b000/xxxx "));
        assert!(head.contains("content-type: application/json"));
        let payload: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({
                "text": "Plan Drift workspace in remote\nDirectory: env/a\nWorkspace: prod"
            })
        );
    }

    #[tokio::test]
    async fn rejected_delivery_fails_the_notification() {
        let (host, server) = serve_once("500 Internal Server Error", "no_service");
        let slack = SlackWebhook::new(&format!("{}/services/T000/B000/XXXX", host)).unwrap();

        let err = slack
            .extra_workspace_in_remote(&CancellationToken::new(), "env/a", "old")
            .await
            .unwrap_err();

        match &err {
            DriftError::Notification { sink, reason } => {
                assert_eq!(*sink, "slack");
                assert!(reason.contains("500"));
                assert!(reason.contains("no_service"));
            }
            other => panic!("unexpected error: {other}"),
        }
        let (_, body) = server.join().unwrap();
        assert!(body.contains("Extra workspace in remote"));
    }
}
