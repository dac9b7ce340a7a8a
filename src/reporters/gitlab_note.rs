use async_trait::async_trait;
use log::warn;

use super::{Reporter, Services};
use crate::constants::{NOTE_MARKER, SUMMARY_ID};
use crate::diff::Diff;

// Upserts the tracking note on the merge request: the first note whose body
// starts with the marker prefix is replaced in place, otherwise a new note is
// created. Never more than one tracking note per merge request, never a
// delete.
pub struct GitLabNoteReporter;

#[async_trait]
impl Reporter for GitLabNoteReporter {
    async fn report(&self, results: &[Diff], services: &Services<'_>) -> anyhow::Result<()> {
        let Some(merge_request_iid) = services.config.merge_request_iid else {
            warn!("Not running in a merge request pipeline, skipping the merge request note.");
            return Ok(());
        };

        let notes = services.gitlab.merge_request_notes(merge_request_iid).await;
        let existing = notes.iter().find(|note| note.body.starts_with(NOTE_MARKER));
        let comment = render(results);

        match existing {
            Some(note) => {
                services
                    .gitlab
                    .modify_merge_request_note(merge_request_iid, note.id, &comment)
                    .await
            }
            None => {
                services
                    .gitlab
                    .create_merge_request_note(merge_request_iid, &comment)
                    .await
            }
        }

        Ok(())
    }
}

fn render(results: &[Diff]) -> String {
    let mut body = format!(
        "{NOTE_MARKER}\n\n| Path | Size | Change  |        |\n| ---- | ---- | ------- | ------ |\n"
    );

    for diff in results {
        let (path, glyph) = if diff.id == SUMMARY_ID {
            let glyph = if diff.is_below_threshold {
                ":white_check_mark:"
            } else {
                ":boom:"
            };
            (format!("**{}**", diff.id), glyph)
        } else {
            let glyph = if !diff.is_below_threshold {
                ":boom:"
            } else if diff.change.raw == 0 {
                ":small_blue_diamond:"
            } else {
                ":white_check_mark:"
            };
            (diff.id.clone(), glyph)
        };

        body.push_str(&format!(
            "| {} | {} | {} ({}%) | {} |\n",
            path, diff.size.pretty, diff.change.pretty, diff.change.percent, glyph
        ));
    }

    body
}
