//! Formatting of retrieved passages into a single context block.

use crate::models::RetrievedPassage;

/// Separator placed between rendered passages.
pub const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

fn render_passage(passage: &RetrievedPassage) -> String {
    format!(
        "### {} | Part: {} | Section: {}\nSource: {}\nIntro note: {}\n\n{}",
        passage.title,
        passage.part,
        passage.section,
        passage.source_filename,
        passage.intro_note,
        passage.text
    )
}

/// Render passages in order, joined by [`PASSAGE_SEPARATOR`].
///
/// An empty slice yields an empty string, which callers treat as "no relevant
/// content".
pub fn format_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(render_passage)
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR)
}
