use anyhow::Result;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

#[derive(Debug, Clone)]
pub struct ArtifactEntry {
    pub name: String,
    pub contents: EntryContents,
}

// Entries named *.json are parsed on extraction, everything else is kept as
// raw text.
#[derive(Debug, Clone)]
pub enum EntryContents {
    Json(serde_json::Value),
    Text(String),
}

// Decode a job-artifact bundle into its named entries. Directory entries are
// skipped.
pub fn extract(data: &[u8]) -> Result<Vec<ArtifactEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut entries = Vec::new();

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let mut raw = String::new();
        file.read_to_string(&mut raw)?;

        let contents = if name.ends_with(".json") {
            EntryContents::Json(serde_json::from_str(&raw)?)
        } else {
            EntryContents::Text(raw)
        };

        entries.push(ArtifactEntry { name, contents });
    }

    Ok(entries)
}

// Build a bundle from (name, contents) pairs. The counterpart to extract,
// used to fabricate artifact bundles in tests.
pub fn pack(entries: &[(&str, &str)]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, contents) in entries {
        writer.start_file(*name, SimpleFileOptions::default())?;
        writer.write_all(contents.as_bytes())?;
    }

    Ok(writer.finish()?.into_inner())
}
