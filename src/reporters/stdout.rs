use async_trait::async_trait;

use super::{Reporter, Services};
use crate::diff::Diff;

// Dumps the raw results to standard output, mainly useful for piping the
// report into other tooling.
pub struct StdoutReporter;

#[async_trait]
impl Reporter for StdoutReporter {
    async fn report(&self, results: &[Diff], _services: &Services<'_>) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(results)?);
        Ok(())
    }
}
