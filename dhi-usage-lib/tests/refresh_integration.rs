//! End-to-end refresh runs against a wiremock stand-in for the GitHub API

use core::time::Duration;
use dhi_usage_lib::catalog::{Catalog, JobStatus, ProjectFilter};
use dhi_usage_lib::github::{Client, DEFAULT_API_VERSION, DEFAULT_QUERIES, Enricher, SearchAggregator, SearchSettings};
use camino::Utf8PathBuf;
use chrono::{TimeDelta, Utc};
use dhi_usage_lib::refresh::{ABANDONED_JOB_MESSAGE, Orchestrator, TriggerOrigin, TriggerOutcome, startup_catch_up};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_body(repos: &[(&str, &str)]) -> serde_json::Value {
    let items: Vec<_> = repos
        .iter()
        .map(|(name, file)| {
            serde_json::json!({
                "path": file,
                "repository": { "full_name": name, "html_url": format!("https://github.com/{name}") }
            })
        })
        .collect();
    serde_json::json!({ "total_count": repos.len(), "incomplete_results": false, "items": items })
}

fn repo_body(name: &str, stars: u64) -> serde_json::Value {
    serde_json::json!({
        "full_name": name,
        "html_url": format!("https://github.com/{name}"),
        "description": format!("{name} service"),
        "stargazers_count": stars,
        "language": "Go"
    })
}

fn commits_body(sha: &str, date: &str) -> serde_json::Value {
    serde_json::json!([{
        "sha": sha,
        "html_url": format!("https://github.com/acme/commit/{sha}"),
        "commit": { "author": { "date": date }, "committer": { "date": date } }
    }])
}

/// First query matches `repos`, every other query matches nothing
async fn mount_search(server: &MockServer, repos: &[(&str, &str)], delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/search/code"))
        .and(query_param("q", DEFAULT_QUERIES[0].query))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(repos)).set_delay(delay))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search/code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&[])))
        .mount(server)
        .await;
}

async fn mount_repo(server: &MockServer, name: &str, stars: u64, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo_body(name, stars)).set_delay(delay))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/repos/{name}/commits")))
        .respond_with(ResponseTemplate::new(200).set_body_json(commits_body("abc123", "2024-03-01T12:00:00Z")))
        .mount(server)
        .await;
}

fn orchestrator(server: &MockServer, catalog: Catalog, run_timeout: Duration) -> Orchestrator {
    let client = Client::new(
        "test-token",
        &server.uri(),
        DEFAULT_API_VERSION,
        Duration::from_secs(5),
        Duration::from_millis(5),
    )
    .unwrap();

    let settings = SearchSettings {
        page_delay: Duration::ZERO,
        max_rate_limit_retries: 1,
        ..SearchSettings::default()
    };

    Orchestrator::new(
        catalog,
        SearchAggregator::new(client.clone(), DEFAULT_QUERIES, settings),
        Enricher::new(client, Duration::ZERO),
        run_timeout,
    )
}

fn catalog_file() -> (TempDir, Utf8PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let db = Utf8PathBuf::try_from(tmp.path().join("catalog.db")).unwrap();
    (tmp, db)
}

fn started(outcome: TriggerOutcome) -> (i64, JoinHandle<JobStatus>) {
    match outcome {
        TriggerOutcome::Started { job_id, handle } => (job_id, handle),
        TriggerOutcome::AlreadyRunning => panic!("expected a run to start"),
    }
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_successful_run_records_projects_and_snapshot() {
    let server = MockServer::start().await;
    mount_search(&server, &[("acme/web", "Dockerfile"), ("acme/api", "deploy/Dockerfile")], Duration::ZERO).await;
    mount_repo(&server, "acme/web", 1500, Duration::ZERO).await;
    mount_repo(&server, "acme/api", 250, Duration::ZERO).await;

    let (_tmp, db) = catalog_file();
    let catalog = Catalog::open(&db).unwrap();
    let orch = orchestrator(&server, catalog.clone(), Duration::from_secs(30));

    let (job_id, handle) = started(orch.trigger(TriggerOrigin::Manual).unwrap());
    assert_eq!(handle.await.unwrap(), JobStatus::Completed);
    assert!(!orch.is_running());

    let job = catalog.job(job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.projects_found, 2);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert_eq!(job.error_message, None);

    let web = catalog.project("acme/web").unwrap().unwrap();
    assert_eq!(web.stars, 1500);
    assert_eq!(web.category, DEFAULT_QUERIES[0].name);
    assert_eq!(web.file_url, "https://github.com/acme/web/blob/HEAD/Dockerfile");
    assert_eq!(web.adoption_commit_sha.as_deref(), Some("abc123"));
    assert!(web.adopted_at.is_some());

    let stats = catalog.stats().unwrap();
    let snapshots = catalog.snapshots(10).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].total_projects, stats.total_projects);
    assert_eq!(snapshots[0].total_stars, 1750);
    assert_eq!(snapshots[0].popular_count, 1);
    assert_eq!(snapshots[0].notable_count, 1);

    // Reopening the file sees the same catalog
    drop(orch);
    drop(catalog);
    let reopened = Catalog::open(&db).unwrap();
    assert_eq!(reopened.list_projects(&ProjectFilter::default()).unwrap().len(), 2);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_second_trigger_while_running_is_declined() {
    let server = MockServer::start().await;
    mount_search(&server, &[("acme/web", "Dockerfile")], Duration::from_millis(300)).await;
    mount_repo(&server, "acme/web", 10, Duration::ZERO).await;

    let catalog = Catalog::open_in_memory().unwrap();
    let orch = orchestrator(&server, catalog.clone(), Duration::from_secs(30));

    let (job_id, handle) = started(orch.trigger(TriggerOrigin::Manual).unwrap());
    assert!(orch.is_running());

    assert!(matches!(orch.trigger(TriggerOrigin::Scheduled).unwrap(), TriggerOutcome::AlreadyRunning));
    assert!(matches!(orch.trigger(TriggerOrigin::Manual).unwrap(), TriggerOutcome::AlreadyRunning));

    // The declined triggers created no job
    assert_eq!(catalog.latest_job().unwrap().unwrap().id, job_id);

    let status = orch.status().unwrap();
    assert!(status.is_running);

    assert_eq!(handle.await.unwrap(), JobStatus::Completed);
    assert!(!orch.is_running());

    // The flag is free again
    let (next_id, handle) = started(orch.trigger(TriggerOrigin::Manual).unwrap());
    assert!(next_id > job_id);
    assert_eq!(handle.await.unwrap(), JobStatus::Completed);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_timeout_fails_job_and_keeps_earlier_upserts() {
    let server = MockServer::start().await;
    mount_search(&server, &[("acme/fast", "Dockerfile"), ("zeta/slow", "Dockerfile")], Duration::ZERO).await;
    mount_repo(&server, "acme/fast", 5, Duration::ZERO).await;
    mount_repo(&server, "zeta/slow", 5, Duration::from_secs(10)).await;

    let catalog = Catalog::open_in_memory().unwrap();
    let orch = orchestrator(&server, catalog.clone(), Duration::from_millis(500));

    let (job_id, handle) = started(orch.trigger(TriggerOrigin::Manual).unwrap());
    assert_eq!(handle.await.unwrap(), JobStatus::Failed);
    assert!(!orch.is_running());

    let job = catalog.job(job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("timed out"));
    assert!(job.completed_at.is_some());

    // Enrichment runs in name order, so the fast repository was stored before the limit hit
    assert!(catalog.project("acme/fast").unwrap().is_some());
    assert!(catalog.project("zeta/slow").unwrap().is_none());
    assert!(catalog.snapshots(10).unwrap().is_empty());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_search_failure_fails_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/code"))
        .respond_with(ResponseTemplate::new(422).set_body_string("Validation Failed"))
        .mount(&server)
        .await;

    let catalog = Catalog::open_in_memory().unwrap();
    let orch = orchestrator(&server, catalog.clone(), Duration::from_secs(30));

    let (job_id, handle) = started(orch.trigger(TriggerOrigin::Manual).unwrap());
    assert_eq!(handle.await.unwrap(), JobStatus::Failed);

    let job = catalog.job(job_id).unwrap().unwrap();
    assert!(!job.error_message.unwrap().is_empty());
    assert_eq!(catalog.stats().unwrap().total_projects, 0);
    assert!(catalog.snapshots(10).unwrap().is_empty());
    assert!(catalog.last_completed_job().unwrap().is_none());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_failed_repository_is_skipped() {
    let server = MockServer::start().await;
    mount_search(&server, &[("acme/gone", "Dockerfile"), ("acme/web", "Dockerfile")], Duration::ZERO).await;
    mount_repo(&server, "acme/web", 10, Duration::ZERO).await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let catalog = Catalog::open_in_memory().unwrap();
    let orch = orchestrator(&server, catalog.clone(), Duration::from_secs(30));

    let (job_id, handle) = started(orch.trigger(TriggerOrigin::Manual).unwrap());
    assert_eq!(handle.await.unwrap(), JobStatus::Completed);

    assert_eq!(catalog.job(job_id).unwrap().unwrap().projects_found, 1);
    assert!(catalog.project("acme/gone").unwrap().is_none());
    assert!(catalog.project("acme/web").unwrap().is_some());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_known_adoption_is_not_looked_up_again() {
    let server = MockServer::start().await;
    mount_search(&server, &[("acme/web", "Dockerfile")], Duration::ZERO).await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo_body("acme/web", 10)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(commits_body("first", "2024-01-01T00:00:00Z")))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = Catalog::open_in_memory().unwrap();
    let orch = orchestrator(&server, catalog.clone(), Duration::from_secs(30));

    for _ in 0..2 {
        let (_, handle) = started(orch.trigger(TriggerOrigin::Scheduled).unwrap());
        assert_eq!(handle.await.unwrap(), JobStatus::Completed);
    }

    let project = catalog.project("acme/web").unwrap().unwrap();
    assert_eq!(project.adoption_commit_sha.as_deref(), Some("first"));
    assert_eq!(catalog.snapshots(10).unwrap().len(), 2);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_abandoned_jobs_are_recovered() {
    let server = MockServer::start().await;
    let catalog = Catalog::open_in_memory().unwrap();

    let now = Utc::now();
    let stuck = catalog.create_job(now).unwrap();
    catalog.start_job(stuck, now).unwrap();
    let pending = catalog.create_job(now).unwrap();

    let orch = orchestrator(&server, catalog.clone(), Duration::from_secs(30));
    assert_eq!(orch.recover_abandoned_jobs().unwrap(), 2);

    for id in [stuck, pending] {
        let job = catalog.job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(ABANDONED_JOB_MESSAGE));
    }

    assert!(catalog.running_job().unwrap().is_none());
    assert_eq!(orch.recover_abandoned_jobs().unwrap(), 0);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_shutdown_refuses_new_runs() {
    let server = MockServer::start().await;
    let orch = orchestrator(&server, Catalog::open_in_memory().unwrap(), Duration::from_secs(30));

    orch.shutdown();
    assert!(orch.trigger(TriggerOrigin::Manual).is_err());
    assert!(!orch.is_running());
    assert!(orch.catalog().latest_job().unwrap().is_none());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_runs_are_exclusive_across_handles_on_one_file() {
    let server = MockServer::start().await;
    mount_search(&server, &[("acme/web", "Dockerfile")], Duration::from_millis(400)).await;
    mount_repo(&server, "acme/web", 10, Duration::ZERO).await;

    // Each orchestrator stands in for a separate process with its own connection
    let (_tmp, db) = catalog_file();
    let serving = orchestrator(&server, Catalog::open(&db).unwrap(), Duration::from_secs(30));
    let foreground = orchestrator(&server, Catalog::open(&db).unwrap(), Duration::from_secs(30));

    let (job_id, handle) = started(serving.trigger(TriggerOrigin::Scheduled).unwrap());
    assert!(matches!(foreground.trigger(TriggerOrigin::Manual).unwrap(), TriggerOutcome::AlreadyRunning));
    assert!(!foreground.is_running());

    // The live job is not mistaken for an abandoned one
    assert_eq!(foreground.recover_abandoned_jobs().unwrap(), 0);

    let catalog = foreground.catalog();
    assert_eq!(catalog.latest_job().unwrap().unwrap().id, job_id);
    assert_eq!(catalog.running_job().unwrap().unwrap().id, job_id);

    assert_eq!(handle.await.unwrap(), JobStatus::Completed);
    assert_eq!(catalog.snapshots(10).unwrap().len(), 1);

    let (next_id, handle) = started(foreground.trigger(TriggerOrigin::Manual).unwrap());
    assert!(next_id > job_id);
    assert_eq!(handle.await.unwrap(), JobStatus::Completed);
    assert_eq!(catalog.snapshots(10).unwrap().len(), 2);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_startup_catch_up_runs_when_never_refreshed() {
    let server = MockServer::start().await;
    mount_search(&server, &[("acme/web", "Dockerfile")], Duration::ZERO).await;
    mount_repo(&server, "acme/web", 10, Duration::ZERO).await;

    let catalog = Catalog::open_in_memory().unwrap();
    let orch = orchestrator(&server, catalog.clone(), Duration::from_secs(30));

    let outcome = startup_catch_up(&orch, Duration::from_secs(24 * 3600)).unwrap().unwrap();
    let (job_id, handle) = started(outcome);
    assert_eq!(handle.await.unwrap(), JobStatus::Completed);

    assert_eq!(catalog.last_completed_job().unwrap().unwrap().id, job_id);
    assert!(catalog.project("acme/web").unwrap().is_some());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_startup_catch_up_runs_when_last_refresh_is_stale() {
    let server = MockServer::start().await;
    mount_search(&server, &[], Duration::ZERO).await;

    let catalog = Catalog::open_in_memory().unwrap();
    let long_ago = Utc::now() - TimeDelta::hours(30);
    let old = catalog.create_job(long_ago).unwrap();
    catalog.start_job(old, long_ago).unwrap();
    catalog.complete_job(old, 4, long_ago).unwrap();

    let orch = orchestrator(&server, catalog.clone(), Duration::from_secs(30));
    let outcome = startup_catch_up(&orch, Duration::from_secs(24 * 3600)).unwrap().unwrap();
    let (job_id, handle) = started(outcome);
    assert!(job_id > old);
    assert_eq!(handle.await.unwrap(), JobStatus::Completed);

    // Now fresh, so a second startup does nothing
    assert!(startup_catch_up(&orch, Duration::from_secs(24 * 3600)).unwrap().is_none());
    assert_eq!(catalog.last_completed_job().unwrap().unwrap().id, job_id);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Miri cannot call CreateIoCompletionPort")]
async fn test_unrecordable_completion_still_closes_job() {
    let server = MockServer::start().await;
    mount_search(&server, &[], Duration::ZERO).await;

    let (_tmp, db) = catalog_file();
    let catalog = Catalog::open(&db).unwrap();

    let raw = rusqlite::Connection::open(&db).unwrap();
    raw.execute_batch(
        "CREATE TRIGGER reject_completion BEFORE UPDATE ON refresh_jobs \
         WHEN NEW.status = 'completed' BEGIN SELECT RAISE(ABORT, 'completion rejected'); END;",
    )
    .unwrap();
    drop(raw);

    let orch = orchestrator(&server, catalog.clone(), Duration::from_secs(30));
    let (job_id, handle) = started(orch.trigger(TriggerOrigin::Manual).unwrap());
    assert_eq!(handle.await.unwrap(), JobStatus::Failed);
    assert!(!orch.is_running());

    let job = catalog.job(job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.completed_at.is_some());
    assert!(job.error_message.unwrap().contains("could not record completion"));
    assert!(catalog.snapshots(10).unwrap().is_empty());
    assert!(catalog.running_job().unwrap().is_none());
}
