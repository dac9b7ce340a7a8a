use std::time::Duration;

// Marker identifying the tracking note on a merge request. The upsert protocol
// matches on this prefix, so changing it orphans existing notes.
pub const NOTE_MARKER: &str = "### :package: file-size-change report";

// Wait between status polls of a pipeline job that is still in the pending class.
pub const JOB_POLL_INTERVAL: Duration = Duration::from_millis(1000);

// Id of the synthetic diff aggregating total bytes across all files.
pub const SUMMARY_ID: &str = "summary";

// Timeout applied to every request against the GitLab API.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
