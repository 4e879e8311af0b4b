use serde::{Deserialize, Serialize};

/// A passage returned by the vector store for one query.
///
/// Structural fields come from the Repertoire metadata; any of them may be
/// empty for records that were never enriched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub title: String,
    pub part: String,
    pub section: String,
    pub intro_note: String,
    pub source_filename: String,
    /// Similarity in `[0, 1]`, higher is closer.
    pub score: f32,
}
