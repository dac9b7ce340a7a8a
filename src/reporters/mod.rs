mod gitlab_note;
mod stdout;

use async_trait::async_trait;
use futures::future::join_all;
use log::{error, warn};

use crate::config::Config;
use crate::diff::Diff;
use crate::gitlab::GitLabApi;

pub use gitlab_note::GitLabNoteReporter;
pub use stdout::StdoutReporter;

// Everything a reporter may need besides the results themselves.
pub struct Services<'a> {
    pub gitlab: &'a GitLabApi,
    pub config: &'a Config,
}

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, results: &[Diff], services: &Services<'_>) -> anyhow::Result<()>;
}

pub const REPORTER_IDS: &[&str] = &["stdout", "gitlab-pr-note"];

// Reporter ids arrive as free-form strings from the CLI, so resolution is a
// runtime-checked lookup, not a type-level guarantee.
pub fn resolve(id: &str) -> Option<Box<dyn Reporter>> {
    match id {
        "stdout" => Some(Box::new(StdoutReporter)),
        "gitlab-pr-note" => Some(Box::new(GitLabNoteReporter)),
        _ => None,
    }
}

// Runs all requested reporters concurrently. Unknown ids are skipped with a
// warning and a failing reporter never affects its siblings or the run.
pub async fn run_all(ids: &[String], results: &[Diff], services: &Services<'_>) {
    let executions = ids.iter().map(|id| async move {
        match resolve(id) {
            Some(reporter) => execute(id, reporter.as_ref(), results, services).await,
            None => warn!(
                "Unable to resolve reporter \"{}\". Available values are \"{}\".",
                id,
                REPORTER_IDS.join(", ")
            ),
        }
    });

    join_all(executions).await;
}

async fn execute(id: &str, reporter: &dyn Reporter, results: &[Diff], services: &Services<'_>) {
    if let Err(err) = reporter.report(results, services).await {
        error!("Failed to execute reporter \"{}\": {:#}", id, err);
    }
}
