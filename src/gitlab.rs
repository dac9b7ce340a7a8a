use anyhow::Result;
use log::{error, info, warn};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::archive::{self, ArtifactEntry};
use crate::config::Config;
use crate::constants::JOB_POLL_INTERVAL;
use crate::http::{HttpClient, HttpResponse};
use crate::types::{MergeRequestNote, Pipeline, PipelineJob};

// Flat wrapper around the GitLab v4 endpoints this tool needs. Every read
// degrades to an empty/None value on failure (warn, never fatal); the two note
// writes log an error and continue. Only the threshold check at the end of a
// run is allowed to abort.
pub struct GitLabApi {
    http: Arc<dyn HttpClient>,
    api_url: String,
    project_id: u64,
    poll_interval: Duration,
}

impl GitLabApi {
    pub fn new(config: &Config, http: Arc<dyn HttpClient>) -> Self {
        GitLabApi {
            http,
            api_url: config.api_url.clone(),
            project_id: config.project_id,
            poll_interval: JOB_POLL_INTERVAL,
        }
    }

    // Overrides the wait between job status polls; tests run with zero.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    // Walks the newest page of pipelines for the ref, front to back, and
    // returns the job from the first pipeline whose job list contains a
    // name-exact match, polling it out of the pending class first.
    //
    // Two deliberate limitations, bounded externally by the CI job timeout and
    // the pipeline history respectively: the poll loop has no attempt cap, and
    // a terminal-but-failed job is returned as-is instead of falling back to an
    // older pipeline's successful run.
    pub async fn resolve_latest_job(&self, git_ref: &str, job_name: &str) -> Option<PipelineJob> {
        info!(
            "Resolving pipeline job for name \"{}\" on ref \"{}\"...",
            job_name, git_ref
        );

        let pipelines = self.pipelines_for_ref(git_ref).await;

        for pipeline in pipelines {
            let jobs = self.pipeline_jobs(pipeline.id).await;
            let mut job = jobs.into_iter().find(|job| job.name == job_name);

            loop {
                let (pending_id, pending_status) = match &job {
                    Some(candidate) if candidate.status.is_pending() => {
                        (candidate.id, candidate.status)
                    }
                    _ => break,
                };

                info!(
                    "Pipeline job \"{}\" is still in status \"{}\", waiting for completion...",
                    pending_id, pending_status
                );
                time::sleep(self.poll_interval).await;
                job = self.pipeline_job(pending_id).await;
            }

            match job {
                Some(job) => {
                    info!(
                        "Resolved pipeline job \"{}\" for name \"{}\" on ref \"{}\"",
                        job.id, job_name, git_ref
                    );
                    return Some(job);
                }
                None => warn!(
                    "No pipeline job found for name \"{}\" on ref \"{}\". Checking the next pipeline...",
                    job_name, git_ref
                ),
            }
        }

        None
    }

    pub async fn pipelines_for_ref(&self, git_ref: &str) -> Vec<Pipeline> {
        let url = format!(
            "{}/projects/{}/pipelines?ref={}",
            self.api_url, self.project_id, git_ref
        );
        self.get_json(&url, &format!("the pipelines for ref \"{}\"", git_ref))
            .await
            .unwrap_or_default()
    }

    pub async fn pipeline_jobs(&self, pipeline_id: u64) -> Vec<PipelineJob> {
        let url = format!(
            "{}/projects/{}/pipelines/{}/jobs?include_retried=true",
            self.api_url, self.project_id, pipeline_id
        );
        self.get_json(&url, &format!("the pipeline jobs for id \"{}\"", pipeline_id))
            .await
            .unwrap_or_default()
    }

    pub async fn pipeline_job(&self, job_id: u64) -> Option<PipelineJob> {
        let url = format!("{}/projects/{}/jobs/{}", self.api_url, self.project_id, job_id);
        self.get_json(&url, &format!("the pipeline job for id \"{}\"", job_id))
            .await
    }

    // Fetches and unpacks the artifact bundle attached to a job. A missing
    // bundle, a failed fetch and a corrupt archive all come back empty.
    pub async fn job_artifacts(&self, job_id: u64) -> Vec<ArtifactEntry> {
        let url = format!(
            "{}/projects/{}/jobs/{}/artifacts",
            self.api_url, self.project_id, job_id
        );

        let response = match self.get(&url).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Failed to retrieve the job artifacts for id \"{}\": {}", job_id, err);
                return Vec::new();
            }
        };

        if response.status != 200 {
            warn!(
                "Failed to retrieve the job artifacts for id \"{}\" (status {}): {}",
                job_id,
                response.status,
                response.text()
            );
            return Vec::new();
        }

        match archive::extract(&response.body) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Failed to unpack the job artifacts for id \"{}\": {}", job_id, err);
                Vec::new()
            }
        }
    }

    pub async fn merge_request_notes(&self, merge_request_iid: u64) -> Vec<MergeRequestNote> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/notes",
            self.api_url, self.project_id, merge_request_iid
        );
        self.get_json(
            &url,
            &format!("the merge request notes for iid \"{}\"", merge_request_iid),
        )
        .await
        .unwrap_or_default()
    }

    pub async fn create_merge_request_note(&self, merge_request_iid: u64, comment: &str) {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/notes",
            self.api_url, self.project_id, merge_request_iid
        );
        let body = serde_json::json!({ "body": comment });

        match self.http.request(Method::POST, &url, Some(body)).await {
            Ok(response) if response.status == 201 => {}
            Ok(response) => error!(
                "Failed to create the merge request note for iid \"{}\" (status {}): {}",
                merge_request_iid,
                response.status,
                response.text()
            ),
            Err(err) => error!(
                "Failed to create the merge request note for iid \"{}\": {}",
                merge_request_iid, err
            ),
        }
    }

    pub async fn modify_merge_request_note(
        &self,
        merge_request_iid: u64,
        note_id: u64,
        comment: &str,
    ) {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/notes/{}",
            self.api_url, self.project_id, merge_request_iid, note_id
        );
        let body = serde_json::json!({ "body": comment });

        match self.http.request(Method::PUT, &url, Some(body)).await {
            Ok(response) if response.status == 200 => {}
            Ok(response) => error!(
                "Failed to update the merge request note \"{}\" for iid \"{}\" (status {}): {}",
                note_id,
                merge_request_iid,
                response.status,
                response.text()
            ),
            Err(err) => error!(
                "Failed to update the merge request note \"{}\" for iid \"{}\": {}",
                note_id, merge_request_iid, err
            ),
        }
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.http.request(Method::GET, url, None).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Option<T> {
        match self.get(url).await {
            Ok(response) if response.status == 200 => match response.json() {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!("Failed to decode {}: {}", what, err);
                    None
                }
            },
            Ok(response) => {
                warn!(
                    "Failed to retrieve {} (status {}): {}",
                    what,
                    response.status,
                    response.text()
                );
                None
            }
            Err(err) => {
                warn!("Failed to retrieve {}: {}", what, err);
                None
            }
        }
    }
}
