use crate::entry::{EntryId, HistoryEntry};

/// One table row: timestamp, content preview, comma-joined tags. Rows keep
/// the order of the entries they were built from (newest first when built
/// from `HistoryStore::load_all`).
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow {
    pub id: EntryId,
    pub timestamp: String,
    pub preview: String,
    pub tags: String,
}

impl ViewRow {
    fn from_entry(entry: &HistoryEntry, preview_chars: usize) -> Self {
        Self {
            id: entry.id(),
            timestamp: entry.timestamp_str(),
            preview: entry.preview_with(preview_chars),
            tags: entry.tags.join(","),
        }
    }

    /// Case-insensitive containment across every displayed field.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.timestamp.to_lowercase().contains(&query)
            || self.preview.to_lowercase().contains(&query)
            || self.tags.to_lowercase().contains(&query)
    }
}

pub fn rows(entries: &[HistoryEntry], preview_chars: usize) -> Vec<ViewRow> {
    entries
        .iter()
        .map(|e| ViewRow::from_entry(e, preview_chars))
        .collect()
}

pub fn filter_rows(rows: &[ViewRow], query: &str) -> Vec<ViewRow> {
    if query.is_empty() {
        return rows.to_vec();
    }
    rows.iter().filter(|r| r.matches(query)).cloned().collect()
}
