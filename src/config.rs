use anyhow::{anyhow, Result};
use std::env;

// CI environment configuration. Built once at the process boundary and passed
// down explicitly; nothing reads the environment after construction.
#[derive(Debug, Clone)]
pub struct Config {
    // Base URL of the GitLab v4 API, e.g. "https://gitlab.com/api/v4".
    pub api_url: String,
    pub project_id: u64,
    // Name of the CI job producing the size artifact, used to locate the prior run.
    pub job_name: String,
    // Ref the comparison baseline is resolved against.
    pub target_ref: String,
    // Absent (or 0) outside of merge request pipelines.
    pub merge_request_iid: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_url = required("CI_API_V4_URL")?;
        let project_id = required("CI_PROJECT_ID")?
            .trim()
            .parse::<u64>()
            .map_err(|_| anyhow!("CI_PROJECT_ID must be a numeric project id"))?;
        let job_name = required("CI_JOB_NAME")?;

        let target_ref = env::var("CI_DEFAULT_BRANCH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "main".to_string());

        let merge_request_iid = match env::var("CI_MERGE_REQUEST_IID") {
            Ok(value) if !value.trim().is_empty() => {
                let iid = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| anyhow!("CI_MERGE_REQUEST_IID must be a numeric merge request iid"))?;
                (iid != 0).then_some(iid)
            }
            _ => None,
        };

        Ok(Config {
            api_url,
            project_id,
            job_name,
            target_ref,
            merge_request_iid,
        })
    }

    pub fn is_merge_request(&self) -> bool {
        self.merge_request_iid.is_some()
    }
}

fn required(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(anyhow!("{} environment variable is not set or empty", key)),
    }
}
