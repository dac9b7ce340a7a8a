use anyhow::{bail, Result};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

use crate::archive::EntryContents;
use crate::config::Config;
use crate::constants::SUMMARY_ID;
use crate::diff::{create_diff, Diff, Sizes};
use crate::file::{self, parse_size};
use crate::gitlab::GitLabApi;
use crate::http::{HttpClient, ReqwestHttp};
use crate::reporters::{self, Services};
use crate::types::FileStat;

#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub file_patterns: Vec<String>,
    // Where the current stats are persisted; also the artifact entry looked up
    // in the previous run's bundle.
    pub out_file: String,
    pub auth: String,
    pub reporters: Vec<String>,
    pub thresholds: Thresholds,
}

// Human-readable size strings, e.g. "200 KiB".
#[derive(Debug, Clone, Default)]
pub struct Thresholds {
    pub each: Option<String>,
    pub overall: Option<String>,
}

pub fn default_reporters() -> Vec<String> {
    vec!["gitlab-pr-note".to_string()]
}

// Entry point: collects current file sizes, resolves the previous run's sizes
// from the base branch, persists the new artifact, reports the comparison and
// enforces the thresholds.
pub async fn diff(options: DiffOptions, config: &Config) -> Result<Vec<Diff>> {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttp::new(&options.auth)?);
    diff_with_client(options, config, http).await
}

pub async fn diff_with_client(
    options: DiffOptions,
    config: &Config,
    http: Arc<dyn HttpClient>,
) -> Result<Vec<Diff>> {
    let gitlab = GitLabApi::new(config, http);
    let threshold_each = options.thresholds.each.as_deref().map(parse_size).transpose()?;
    let threshold_overall = options
        .thresholds
        .overall
        .as_deref()
        .map(parse_size)
        .transpose()?;
    let is_merge_request = config.is_merge_request();

    // Current-filesystem stats and prior-artifact resolution are independent;
    // run them on concurrent branches and join before diffing.
    let (current, last) = tokio::join!(
        file::collect_stats(&options.file_patterns),
        resolve_last_stats(&gitlab, config, &options.out_file, is_merge_request),
    );
    let current = current?;

    persist_stats(&options.out_file, &current).await?;

    if !is_merge_request {
        // Baseline mode: the artifact is all that is needed.
        info!("Finished creating the last known file-size artifact.");
        return Ok(Vec::new());
    }

    if last.is_some() {
        info!("Resolved last known file-size artifact, creating the change report...");
    } else {
        warn!("Unable to resolve last known file-size artifact, creating the initial change report...");
    }

    let last = last.unwrap_or_default();
    let mut results: Vec<Diff> = current
        .iter()
        .map(|stat| {
            let previous = last
                .iter()
                .find(|candidate| candidate.path == stat.path)
                .map(|candidate| candidate.bytes)
                .unwrap_or(0);
            create_diff(
                &stat.path,
                Sizes {
                    current: stat.bytes,
                    last: previous,
                },
                threshold_each,
            )
        })
        .collect();
    results.push(create_diff(
        SUMMARY_ID,
        Sizes {
            current: current.iter().map(|stat| stat.bytes).sum(),
            last: last.iter().map(|stat| stat.bytes).sum(),
        },
        threshold_overall,
    ));

    let services = Services {
        gitlab: &gitlab,
        config,
    };
    reporters::run_all(&options.reporters, &results, &services).await;

    info!("Finished executing all reporters.");
    info!("Checking if all thresholds are met...");

    if results.iter().any(|diff| !diff.is_below_threshold) {
        bail!("One or more files do not meet the specified thresholds. See reporter output above for more details.");
    }

    info!("Thresholds are met, we are good to go! :-)");

    Ok(results)
}

// Resolves the previous run's stats from the latest terminal execution of the
// configured job on the target ref. Any miss along the way (no pipeline, no
// job, no bundle, no matching entry, undecodable entry) means "no prior data".
async fn resolve_last_stats(
    gitlab: &GitLabApi,
    config: &Config,
    out_file: &str,
    is_merge_request: bool,
) -> Option<Vec<FileStat>> {
    if !is_merge_request {
        return None;
    }

    let job = gitlab
        .resolve_latest_job(&config.target_ref, &config.job_name)
        .await?;
    let artifacts = gitlab.job_artifacts(job.id).await;

    let wanted = out_file.trim_start_matches("./");
    let entry = artifacts.into_iter().find(|entry| entry.name == wanted)?;

    match entry.contents {
        EntryContents::Json(value) => match serde_json::from_value(value) {
            Ok(stats) => Some(stats),
            Err(err) => {
                warn!("Failed to decode the last known file-size artifact: {}", err);
                None
            }
        },
        EntryContents::Text(_) => {
            warn!(
                "The last known file-size artifact \"{}\" is not valid JSON.",
                wanted
            );
            None
        }
    }
}

async fn persist_stats(out_file: &str, stats: &[FileStat]) -> Result<()> {
    let path = Path::new(out_file);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    tokio::fs::write(path, serde_json::to_string_pretty(stats)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive;
    use crate::constants::NOTE_MARKER;
    use crate::diff::DiffStatus;
    use crate::http::mock::MockHttp;
    use reqwest::Method;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const API: &str = "https://gitlab.com/api/v4";

    struct Fixture {
        dir: TempDir,
        http: Arc<MockHttp>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("app.js"), vec![0u8; 224]).unwrap();
            fs::write(dir.path().join("app.css"), vec![0u8; 64]).unwrap();

            Fixture {
                dir,
                http: Arc::new(MockHttp::new()),
            }
        }

        fn out_file(&self) -> String {
            format!("{}/report/sizes.json", self.dir.path().to_string_lossy())
        }

        fn options(&self) -> DiffOptions {
            DiffOptions {
                file_patterns: vec![format!("{}/*.js", self.dir.path().to_string_lossy()),
                    format!("{}/*.css", self.dir.path().to_string_lossy())],
                out_file: self.out_file(),
                auth: "my-gitlab-token".to_string(),
                reporters: default_reporters(),
                thresholds: Thresholds::default(),
            }
        }

        fn config(&self, merge_request_iid: Option<u64>) -> Config {
            Config {
                api_url: API.to_string(),
                project_id: 2,
                job_name: "file-size-change".to_string(),
                target_ref: "main".to_string(),
                merge_request_iid,
            }
        }

        fn stat_path(&self, name: &str) -> String {
            format!("{}/{}", self.dir.path().to_string_lossy(), name)
        }

        // Scripts the happy path: one pipeline, the job, an artifact bundle
        // holding the previous run's stats, no existing notes.
        fn mock_previous_run(&self, previous: serde_json::Value) {
            self.http.mock_json(
                Method::GET,
                &format!("{API}/projects/2/pipelines?ref=main"),
                200,
                json!([{ "id": 20391 }]),
            );
            self.http.mock_json(
                Method::GET,
                &format!("{API}/projects/2/pipelines/20391/jobs?include_retried=true"),
                200,
                json!([{ "id": 219273, "name": "file-size-change", "status": "success" }]),
            );
            let bundle =
                archive::pack(&[(self.out_file().as_str(), &previous.to_string())]).unwrap();
            self.http.mock_raw(
                Method::GET,
                &format!("{API}/projects/2/jobs/219273/artifacts"),
                200,
                bundle.into(),
            );
            self.http.mock_json(
                Method::GET,
                &format!("{API}/projects/2/merge_requests/4/notes"),
                200,
                json!([]),
            );
            self.http.mock_json(
                Method::POST,
                &format!("{API}/projects/2/merge_requests/4/notes"),
                201,
                json!({ "id": 1 }),
            );
        }
    }

    #[tokio::test]
    async fn baseline_mode_persists_stats_and_returns_no_results() {
        let fixture = Fixture::new();
        let config = fixture.config(None);

        let results = diff_with_client(fixture.options(), &config, fixture.http.clone())
            .await
            .unwrap();

        assert!(results.is_empty());
        // No merge request, no network traffic at all.
        assert!(fixture.http.requests().is_empty());

        let written: Vec<FileStat> =
            serde_json::from_str(&fs::read_to_string(fixture.out_file()).unwrap()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].path, fixture.stat_path("app.css"));
        assert_eq!(written[0].bytes, 64);
        assert_eq!(written[1].path, fixture.stat_path("app.js"));
        assert_eq!(written[1].bytes, 224);
    }

    #[tokio::test]
    async fn compares_against_the_previous_run_and_creates_the_note() {
        let fixture = Fixture::new();
        let config = fixture.config(Some(4));
        fixture.mock_previous_run(json!([
            { "path": fixture.stat_path("app.css"), "bytes": 64 },
            { "path": fixture.stat_path("app.js"), "bytes": 200 }
        ]));

        let results = diff_with_client(fixture.options(), &config, fixture.http.clone())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].status, DiffStatus::Unchanged);
        assert_eq!(results[1].status, DiffStatus::Increased);
        assert_eq!(results[1].change.raw, 24);
        assert_eq!(results[2].id, SUMMARY_ID);
        assert_eq!(results[2].status, DiffStatus::Increased);
        assert_eq!(results[2].size.raw, 288);

        let creates = fixture
            .http
            .requests_for("POST", &format!("{API}/projects/2/merge_requests/4/notes"));
        assert_eq!(creates.len(), 1);
        let body = creates[0].body.as_ref().unwrap()["body"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(body.starts_with(NOTE_MARKER));
    }

    #[tokio::test]
    async fn updates_the_existing_tracking_note_instead_of_creating_one() {
        let fixture = Fixture::new();
        let config = fixture.config(Some(4));
        fixture.http.mock_json(
            Method::GET,
            &format!("{API}/projects/2/pipelines?ref=main"),
            200,
            json!([]),
        );
        fixture.http.mock_json(
            Method::GET,
            &format!("{API}/projects/2/merge_requests/4/notes"),
            200,
            json!([{ "id": 9, "body": format!("{NOTE_MARKER}\n\nstale") }]),
        );
        fixture.http.mock_json(
            Method::PUT,
            &format!("{API}/projects/2/merge_requests/4/notes/9"),
            200,
            json!({ "id": 9 }),
        );

        diff_with_client(fixture.options(), &config, fixture.http.clone())
            .await
            .unwrap();

        assert_eq!(
            fixture
                .http
                .requests_for("PUT", &format!("{API}/projects/2/merge_requests/4/notes/9"))
                .len(),
            1
        );
        assert!(fixture
            .http
            .requests()
            .iter()
            .all(|request| request.method != "POST"));
    }

    #[tokio::test]
    async fn a_failed_pipeline_listing_treats_every_file_as_added() {
        let fixture = Fixture::new();
        let config = fixture.config(Some(4));
        fixture.http.mock_json(
            Method::GET,
            &format!("{API}/projects/2/pipelines?ref=main"),
            500,
            json!("Whelp that's not good"),
        );
        fixture.http.mock_json(
            Method::GET,
            &format!("{API}/projects/2/merge_requests/4/notes"),
            200,
            json!([]),
        );
        fixture.http.mock_json(
            Method::POST,
            &format!("{API}/projects/2/merge_requests/4/notes"),
            201,
            json!({ "id": 1 }),
        );

        let results = diff_with_client(fixture.options(), &config, fixture.http.clone())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|diff| diff.status == DiffStatus::Added));
    }

    #[tokio::test]
    async fn rejects_when_a_file_exceeds_its_threshold() {
        let fixture = Fixture::new();
        let config = fixture.config(Some(4));
        fixture.mock_previous_run(json!([]));

        let mut options = fixture.options();
        options.thresholds.each = Some("100".to_string());

        let err = diff_with_client(options, &config, fixture.http.clone())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "One or more files do not meet the specified thresholds. See reporter output above for more details."
        );
        // The reporter still ran before the rejection.
        assert_eq!(
            fixture
                .http
                .requests_for("POST", &format!("{API}/projects/2/merge_requests/4/notes"))
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn the_same_thresholds_never_reject_in_baseline_mode() {
        let fixture = Fixture::new();
        let config = fixture.config(None);

        let mut options = fixture.options();
        options.thresholds.each = Some("100".to_string());

        let results = diff_with_client(options, &config, fixture.http.clone())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn a_failing_reporter_does_not_fail_the_run() {
        let fixture = Fixture::new();
        let config = fixture.config(Some(4));
        fixture.http.mock_json(
            Method::GET,
            &format!("{API}/projects/2/pipelines?ref=main"),
            200,
            json!([]),
        );
        // Both note endpoints fail; the reporter degrades and the run succeeds.
        fixture.http.mock_json(
            Method::GET,
            &format!("{API}/projects/2/merge_requests/4/notes"),
            500,
            json!({ "message": "oh no" }),
        );
        fixture.http.mock_json(
            Method::POST,
            &format!("{API}/projects/2/merge_requests/4/notes"),
            500,
            json!({ "message": "oh no" }),
        );

        let results = diff_with_client(fixture.options(), &config, fixture.http.clone())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn unknown_reporter_ids_are_not_fatal() {
        let fixture = Fixture::new();
        let config = fixture.config(Some(4));
        fixture.http.mock_json(
            Method::GET,
            &format!("{API}/projects/2/pipelines?ref=main"),
            200,
            json!([]),
        );

        let mut options = fixture.options();
        options.reporters = vec!["carrier-pigeon".to_string()];

        let results = diff_with_client(options, &config, fixture.http.clone())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn an_unparsable_threshold_is_an_input_error() {
        let fixture = Fixture::new();
        let config = fixture.config(Some(4));

        let mut options = fixture.options();
        options.thresholds.overall = Some("two hundred".to_string());

        assert!(diff_with_client(options, &config, fixture.http.clone())
            .await
            .is_err());
    }
}
