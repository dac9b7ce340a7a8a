use anyhow::{anyhow, Result};
use bytesize::ByteSize;
use std::path::Path;

use crate::types::FileStat;

// Expand the given glob patterns (resolved against the working directory) and
// stat every matched file. Paths come back working-directory relative with
// forward slashes, sorted and deduplicated for deterministic diffing.
pub async fn collect_stats(patterns: &[String]) -> Result<Vec<FileStat>> {
    let cwd = std::env::current_dir()?;
    let mut stats = Vec::new();

    for pattern in patterns {
        let absolute = cwd.join(pattern);
        let absolute = absolute.to_string_lossy();

        for entry in glob::glob(&absolute)? {
            let path = entry?;
            let metadata = tokio::fs::metadata(&path).await?;
            if !metadata.is_file() {
                continue;
            }

            stats.push(FileStat {
                path: relative_path(&cwd, &path),
                bytes: metadata.len(),
            });
        }
    }

    stats.sort_by(|a, b| a.path.cmp(&b.path));
    stats.dedup_by(|a, b| a.path == b.path);

    Ok(stats)
}

fn relative_path(cwd: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(cwd).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

// Human-readable rendering in binary units, e.g. "200.0 KiB".
pub fn format_size(bytes: u64) -> String {
    ByteSize(bytes).display().iec().to_string()
}

// Inverse of format_size, also used for threshold strings from the CLI.
// Accepts anything bytesize understands ("200 KiB", "1.5MB", "131072").
pub fn parse_size(input: &str) -> Result<u64> {
    let size = input
        .trim()
        .parse::<ByteSize>()
        .map_err(|err| anyhow!("unable to detect size for \"{}\": {}", input, err))?;

    Ok(size.as_u64())
}
