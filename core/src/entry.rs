use blake3::Hasher;
use chrono::{NaiveDateTime, Timelike};
use std::collections::HashSet;
use std::fmt;

pub const FIELD_SEPARATOR: &str = " | ";
pub const ESCAPED_SEPARATOR: &str = " || ";
pub const TAGS_PREFIX: &str = "Tags:";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const PREVIEW_CHARS: usize = 100;
const ID_PREFIX_LEN: usize = 8;

/// Content-addressed identity: blake3 over `"{timestamp}|{content}"`.
///
/// Not persisted; recomputed from the decoded line. Tag edits do not change
/// an entry's identity. Byte-identical lines share one id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(String);

impl EntryId {
    /// Rebuild an id from its hex form, e.g. one a UI carried as a string.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 hex characters, for logs and CLI output.
    pub fn short(&self) -> &str {
        self.0.get(..ID_PREFIX_LEN).unwrap_or(&self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recorded clipboard capture.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: NaiveDateTime,
    pub content: String,
    pub tags: Vec<String>,
}

impl HistoryEntry {
    pub fn new(timestamp: NaiveDateTime, content: String, tags: Vec<String>) -> Self {
        Self {
            timestamp,
            content,
            tags,
        }
    }

    /// Entry stamped with the current local time at second precision.
    pub fn captured_now(content: String) -> Self {
        let now = chrono::Local::now().naive_local();
        let timestamp = now.with_nanosecond(0).unwrap_or(now);
        Self::new(timestamp, content, Vec::new())
    }

    pub fn id(&self) -> EntryId {
        let mut hasher = Hasher::new();
        hasher.update(self.timestamp_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.content.as_bytes());
        EntryId(hasher.finalize().to_hex().to_string())
    }

    pub fn timestamp_str(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// First 100 characters of content, with an ellipsis when truncated.
    pub fn preview(&self) -> String {
        self.preview_with(PREVIEW_CHARS)
    }

    pub fn preview_with(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}…")
        } else {
            head
        }
    }

    /// Merge tags in, case-insensitively deduplicated, keeping the order of
    /// first occurrence. Returns whether anything was actually added.
    pub fn add_tags(&mut self, input: &str) -> bool {
        let mut seen: HashSet<String> = self.tags.iter().map(|t| t.to_lowercase()).collect();
        let mut changed = false;
        for tag in parse_tags(input) {
            if seen.insert(tag.to_lowercase()) {
                self.tags.push(tag);
                changed = true;
            }
        }
        changed
    }

    /// Discard existing tags in favor of the given list.
    pub fn replace_tags(&mut self, input: &str) {
        self.tags = parse_tags(input);
    }
}

/// Split comma-separated tag input into trimmed, non-empty, case-insensitively
/// unique labels, first occurrence wins.
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Make content safe for the line-delimited format: newlines become spaces,
/// carriage returns are dropped, and bare ` | ` is escaped to ` || `.
/// Escaping runs to a fixpoint; overlapping runs like ` | | ` need a second
/// pass before no bare separator remains.
pub fn sanitize(content: &str) -> String {
    let mut text = content.replace('\n', " ").replace('\r', "");
    while text.contains(FIELD_SEPARATOR) {
        text = text.replace(FIELD_SEPARATOR, ESCAPED_SEPARATOR);
    }
    text
}

/// One newline-terminated line: `{timestamp} | {content} | Tags: {a,b,c}`.
/// Content must already be sanitized.
pub fn encode(entry: &HistoryEntry) -> String {
    format!(
        "{}{}{}{}{} {}\n",
        entry.timestamp_str(),
        FIELD_SEPARATOR,
        entry.content,
        FIELD_SEPARATOR,
        TAGS_PREFIX,
        entry.tags.join(",")
    )
}

/// Decode one stored line. `None` means the line is malformed (fewer than
/// three fields, or a timestamp outside the fixed format) and should be
/// skipped by the caller.
pub fn decode(line: &str) -> Option<HistoryEntry> {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    let mut parts = trimmed.splitn(3, FIELD_SEPARATOR);
    let timestamp_part = parts.next()?;
    let content = parts.next()?;
    let tags_part = parts.next()?;

    let timestamp = NaiveDateTime::parse_from_str(timestamp_part, TIMESTAMP_FORMAT).ok()?;
    let tags_raw = tags_part
        .strip_prefix(TAGS_PREFIX)
        .map(str::trim_start)
        .unwrap_or(tags_part);

    Some(HistoryEntry::new(
        timestamp,
        content.to_string(),
        parse_tags(tags_raw),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: &str, content: &str, tags: &[&str]) -> HistoryEntry {
        HistoryEntry::new(
            NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).unwrap(),
            content.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[test]
    fn encode_decode_round_trip() {
        let original = entry("2024-01-01 10:00:00", "hello world", &["work", "Snippets"]);
        let line = encode(&original);
        assert_eq!(line, "2024-01-01 10:00:00 | hello world | Tags: work,Snippets\n");
        assert_eq!(decode(&line), Some(original));
    }

    #[test]
    fn round_trip_preserves_empty_tags() {
        let original = entry("2024-01-01 10:00:00", "hello", &[]);
        assert_eq!(decode(&encode(&original)), Some(original));
    }

    #[test]
    fn round_trip_keeps_escaped_separator_canonical() {
        let content = sanitize("line1\nline2 | line3");
        assert_eq!(content, "line1 line2 || line3");
        let original = entry("2024-01-01 10:00:00", &content, &[]);
        let decoded = decode(&encode(&original)).unwrap();
        assert_eq!(decoded.content, "line1 line2 || line3");
    }

    #[test]
    fn sanitize_strips_line_breaks() {
        assert_eq!(sanitize("a\r\nb\rc\nd"), "a bc d");
        assert_eq!(sanitize("a\r\nb"), "a b");
        assert_eq!(sanitize("a\rb"), "ab");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for input in ["plain", "a | b", "a | | b", " | | | ", "x || y"] {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input {input:?}");
            assert!(!once.contains(FIELD_SEPARATOR), "input {input:?}");
        }
    }

    #[test]
    fn decode_rejects_missing_fields() {
        assert_eq!(decode("2024-01-01 10:00:00 | only two fields"), None);
        assert_eq!(decode("just one field"), None);
    }

    #[test]
    fn decode_rejects_bad_timestamp() {
        assert_eq!(decode("not-a-date | content | Tags: "), None);
        assert_eq!(decode("2024-13-40 99:00:00 | content | Tags: "), None);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let short = entry("2024-01-01 10:00:00", "short", &[]);
        assert_eq!(short.preview(), "short");

        let long = entry("2024-01-01 10:00:00", &"é".repeat(150), &[]);
        let preview = long.preview();
        assert_eq!(preview.chars().count(), 101);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn add_tags_is_set_like() {
        let mut e = entry("2024-01-01 10:00:00", "x", &[]);
        assert!(e.add_tags("a,b"));
        assert!(e.add_tags("B, c"));
        assert_eq!(e.tags, vec!["a", "b", "c"]);
        assert!(!e.add_tags("A , b"));
    }

    #[test]
    fn replace_tags_discards_existing() {
        let mut e = entry("2024-01-01 10:00:00", "x", &["old"]);
        e.replace_tags("new, other ,");
        assert_eq!(e.tags, vec!["new", "other"]);
    }

    #[test]
    fn id_ignores_tags_but_not_content() {
        let a = entry("2024-01-01 10:00:00", "x", &[]);
        let mut b = a.clone();
        b.add_tags("later");
        assert_eq!(a.id(), b.id());

        let c = entry("2024-01-01 10:00:00", "y", &[]);
        assert_ne!(a.id(), c.id());
        let d = entry("2024-01-01 10:00:01", "x", &[]);
        assert_ne!(a.id(), d.id());
    }

    #[test]
    fn captured_now_has_second_precision() {
        let e = HistoryEntry::captured_now("x".to_string());
        assert_eq!(e.timestamp.nanosecond(), 0);
        assert_eq!(decode(&encode(&e)), Some(e));
    }
}
