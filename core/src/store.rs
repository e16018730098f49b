use crate::config::Config;
use crate::entry::{self, EntryId, HistoryEntry};
use anyhow::{Context, Result};
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// How tag input applies to an entry's existing tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    Add,
    Replace,
}

/// Outcome of the post-append capacity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityCheck {
    WithinLimit,
    /// Entry count has reached the warning threshold; raised once per
    /// session until `reset_warning` is called.
    NearLimit(usize),
    /// The oldest entries beyond the cap were dropped.
    Trimmed(usize),
}

/// Append-only history log over a single flat file, one encoded entry per
/// line, oldest first on disk.
///
/// Every operation brackets its whole read-or-write pass in one lock
/// acquisition; mutations are a single read-transform-write cycle. The lock
/// guards against intra-process races (poller vs UI mutation) only; the
/// store assumes it is the one process owning the file.
pub struct HistoryStore {
    path: PathBuf,
    max_entries: usize,
    warning_threshold: usize,
    lock: Mutex<()>,
    warned: AtomicBool,
    pending_warning: AtomicUsize,
}

impl HistoryStore {
    pub fn new(path: PathBuf, max_entries: usize, warning_threshold: usize) -> Self {
        Self {
            path,
            max_entries,
            warning_threshold,
            lock: Mutex::new(()),
            warned: AtomicBool::new(false),
            pending_warning: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("failed to create data dir {}", config.data_dir.display())
        })?;
        Ok(Self::new(
            config.history_path(),
            config.max_entries,
            config.warning_threshold,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one encoded line. Never rewrites existing content; the file is
    /// created lazily on first use.
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open history file {}", self.path.display()))?;
        file.write_all(entry::encode(entry).as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        info!("appended entry {}", entry.id().short());
        Ok(())
    }

    /// All decodable entries, newest first. Malformed lines are skipped and
    /// logged, but a plain load never rewrites the file.
    pub fn load_all(&self) -> Result<Vec<HistoryEntry>> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries_locked()?;
        entries.reverse();
        Ok(entries)
    }

    pub fn count(&self) -> Result<usize> {
        let _guard = self.lock.lock();
        Ok(self.read_entries_locked()?.len())
    }

    /// Linear scan for an entry whose stored content equals the candidate.
    /// Both sides are sanitized: the caller passes post-sanitize content.
    pub fn is_duplicate(&self, content: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        Ok(self
            .read_entries_locked()?
            .iter()
            .any(|e| e.content == content))
    }

    /// Apply tag input to every entry matching an id. Returns how many
    /// entries actually changed; 0 means nothing matched (or, in `Add` mode,
    /// every tag was already present).
    pub fn update_tags(
        &self,
        ids: &HashSet<EntryId>,
        tags: &str,
        mode: TagMode,
    ) -> Result<usize> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries_locked()?;
        let mut updated = 0;
        for entry in entries.iter_mut() {
            if !ids.contains(&entry.id()) {
                continue;
            }
            match mode {
                TagMode::Add => {
                    if entry.add_tags(tags) {
                        updated += 1;
                    }
                }
                TagMode::Replace => {
                    entry.replace_tags(tags);
                    updated += 1;
                }
            }
        }
        if updated > 0 {
            self.rewrite_locked(&entries)?;
            info!("updated tags on {updated} entries");
        }
        Ok(updated)
    }

    /// Remove every entry matching an id, preserving the relative order of
    /// the rest. Returns the removed count.
    pub fn delete(&self, ids: &HashSet<EntryId>) -> Result<usize> {
        let _guard = self.lock.lock();
        let entries = self.read_entries_locked()?;
        let before = entries.len();
        let kept: Vec<HistoryEntry> = entries
            .into_iter()
            .filter(|e| !ids.contains(&e.id()))
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.rewrite_locked(&kept)?;
            info!("deleted {removed} entries");
        }
        Ok(removed)
    }

    /// Truncate the log to zero entries.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock();
        fs::write(&self.path, "")
            .with_context(|| format!("failed to clear history file {}", self.path.display()))?;
        info!("history cleared");
        Ok(())
    }

    /// Write entries (all, or only a selection) to another file, oldest
    /// first, in the on-disk line format. Returns the exported count.
    pub fn export(&self, dest: &Path, selection: Option<&HashSet<EntryId>>) -> Result<usize> {
        let _guard = self.lock.lock();
        let entries = self.read_entries_locked()?;
        let mut out = String::new();
        let mut exported = 0;
        for e in &entries {
            if selection.is_none_or(|ids| ids.contains(&e.id())) {
                out.push_str(&entry::encode(e));
                exported += 1;
            }
        }
        fs::write(dest, out)
            .with_context(|| format!("failed to export history to {}", dest.display()))?;
        info!("exported {exported} entries to {}", dest.display());
        Ok(exported)
    }

    /// Post-append check: warn once per session when the count reaches the
    /// threshold, trim oldest-first when it exceeds the cap.
    pub fn enforce_capacity(&self) -> Result<CapacityCheck> {
        let _guard = self.lock.lock();
        let entries = self.read_entries_locked()?;
        let count = entries.len();

        if count > self.max_entries {
            let dropped = count - self.max_entries;
            self.rewrite_locked(&entries[dropped..])?;
            info!("trimmed {dropped} oldest entries, keeping {}", self.max_entries);
            return Ok(CapacityCheck::Trimmed(dropped));
        }

        if count >= self.warning_threshold && !self.warned.swap(true, Ordering::Relaxed) {
            self.pending_warning.store(count, Ordering::Relaxed);
            warn!(
                "history has {count} entries, nearing the cap of {}; oldest entries will be dropped past it",
                self.max_entries
            );
            return Ok(CapacityCheck::NearLimit(count));
        }

        Ok(CapacityCheck::WithinLimit)
    }

    /// A capacity warning raised since the last take, for UIs that learn of
    /// it after the fact. Consumed on read.
    pub fn take_pending_warning(&self) -> Option<usize> {
        match self.pending_warning.swap(0, Ordering::Relaxed) {
            0 => None,
            count => Some(count),
        }
    }

    /// Re-arm the once-per-session capacity warning (e.g. when the UI is
    /// restored from the tray).
    pub fn reset_warning(&self) {
        self.warned.store(false, Ordering::Relaxed);
        self.pending_warning.store(0, Ordering::Relaxed);
    }

    // Callers hold the lock.
    fn read_entries_locked(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read history file {}", self.path.display()))?;
        let mut entries = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match entry::decode(line) {
                Some(e) => entries.push(e),
                None => warn!("skipping malformed history line: {line:?}"),
            }
        }
        Ok(entries)
    }

    // Full rewrite through a temp file and rename, so a crash mid-write
    // cannot truncate the log. Callers hold the lock.
    fn rewrite_locked(&self, entries: &[HistoryEntry]) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("failed to create temp file {}", tmp.display()))?;
            for e in entries {
                file.write_all(entry::encode(e).as_bytes())?;
            }
            file.flush()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace history file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    fn store(dir: &TempDir, max: usize, warn_at: usize) -> HistoryStore {
        HistoryStore::new(dir.path().join("history.txt"), max, warn_at)
    }

    fn entry(ts: &str, content: &str) -> HistoryEntry {
        HistoryEntry::new(
            NaiveDateTime::parse_from_str(ts, entry::TIMESTAMP_FORMAT).unwrap(),
            content.to_string(),
            Vec::new(),
        )
    }

    fn ids(entries: &[HistoryEntry]) -> HashSet<EntryId> {
        entries.iter().map(|e| e.id()).collect()
    }

    #[test]
    fn append_then_load_returns_single_row() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        store
            .append(&entry("2024-01-01 10:00:00", "hello"))
            .unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content, "hello");
    }

    #[test]
    fn missing_file_is_an_empty_log() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        assert_eq!(store.load_all().unwrap(), Vec::new());
        assert!(!store.is_duplicate("anything").unwrap());
    }

    #[test]
    fn load_is_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        store.append(&entry("2024-01-01 10:00:00", "a")).unwrap();
        store.append(&entry("2024-01-01 10:00:01", "b")).unwrap();

        let loaded = store.load_all().unwrap();
        let contents: Vec<&str> = loaded.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "a"]);
    }

    #[test]
    fn capacity_trims_oldest_beyond_cap() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 3, 2);
        for (i, content) in ["a", "b", "c", "d"].iter().enumerate() {
            store
                .append(&entry(&format!("2024-01-01 10:00:0{i}"), content))
                .unwrap();
        }

        assert_eq!(store.enforce_capacity().unwrap(), CapacityCheck::Trimmed(1));
        let contents: Vec<String> = store
            .load_all()
            .unwrap()
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(contents, vec!["d", "c", "b"]);
    }

    #[test]
    fn capacity_warning_fires_once_per_session() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 10, 2);
        store.append(&entry("2024-01-01 10:00:00", "a")).unwrap();
        store.append(&entry("2024-01-01 10:00:01", "b")).unwrap();

        assert_eq!(
            store.enforce_capacity().unwrap(),
            CapacityCheck::NearLimit(2)
        );
        assert_eq!(store.take_pending_warning(), Some(2));
        assert_eq!(store.take_pending_warning(), None);

        store.append(&entry("2024-01-01 10:00:02", "c")).unwrap();
        assert_eq!(store.enforce_capacity().unwrap(), CapacityCheck::WithinLimit);

        store.reset_warning();
        assert_eq!(
            store.enforce_capacity().unwrap(),
            CapacityCheck::NearLimit(3)
        );
    }

    #[test]
    fn duplicate_content_is_detected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        store.append(&entry("2024-01-01 10:00:00", "foo")).unwrap();

        assert!(store.is_duplicate("foo").unwrap());
        assert!(!store.is_duplicate("bar").unwrap());
    }

    #[test]
    fn tag_merge_is_set_like_across_updates() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        let e = entry("2024-01-01 10:00:00", "x");
        store.append(&e).unwrap();
        let targets = ids(&[e]);

        assert_eq!(store.update_tags(&targets, "a,b", TagMode::Add).unwrap(), 1);
        assert_eq!(store.update_tags(&targets, "b,c", TagMode::Add).unwrap(), 1);
        assert_eq!(store.update_tags(&targets, "B", TagMode::Add).unwrap(), 0);

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded[0].tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn replace_mode_discards_old_tags() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        let e = entry("2024-01-01 10:00:00", "x");
        store.append(&e).unwrap();
        let targets = ids(&[e]);

        store.update_tags(&targets, "old", TagMode::Add).unwrap();
        assert_eq!(
            store
                .update_tags(&targets, "fresh", TagMode::Replace)
                .unwrap(),
            1
        );
        assert_eq!(store.load_all().unwrap()[0].tags, vec!["fresh"]);
    }

    #[test]
    fn update_reports_zero_when_nothing_matches() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        store.append(&entry("2024-01-01 10:00:00", "x")).unwrap();

        let ghost = ids(&[entry("2024-01-01 10:00:00", "not stored")]);
        assert_eq!(store.update_tags(&ghost, "a", TagMode::Add).unwrap(), 0);
    }

    #[test]
    fn delete_removes_exactly_the_targets_in_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        let a = entry("2024-01-01 10:00:00", "a");
        let b = entry("2024-01-01 10:00:01", "b");
        let c = entry("2024-01-01 10:00:02", "c");
        for e in [&a, &b, &c] {
            store.append(e).unwrap();
        }

        assert_eq!(store.delete(&ids(&[b])).unwrap(), 1);
        let contents: Vec<String> = store
            .load_all()
            .unwrap()
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(contents, vec!["c", "a"]);
    }

    #[test]
    fn clear_truncates_to_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        store.append(&entry("2024-01-01 10:00:00", "a")).unwrap();
        store.clear().unwrap();

        assert_eq!(store.count().unwrap(), 0);
        assert!(store.path().exists());
    }

    #[test]
    fn malformed_lines_are_skipped_on_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        store.append(&entry("2024-01-01 10:00:00", "good")).unwrap();
        let mut raw = fs::read_to_string(store.path()).unwrap();
        raw.push_str("only | two-fields\n");
        fs::write(store.path(), raw).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content, "good");
        // plain load leaves the file untouched
        assert!(
            fs::read_to_string(store.path())
                .unwrap()
                .contains("two-fields")
        );
    }

    #[test]
    fn mutation_rewrite_drops_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        let e = entry("2024-01-01 10:00:00", "good");
        store.append(&e).unwrap();
        let mut raw = fs::read_to_string(store.path()).unwrap();
        raw.push_str("only | two-fields\n");
        fs::write(store.path(), raw).unwrap();

        store.update_tags(&ids(&[e]), "t", TagMode::Add).unwrap();
        assert!(
            !fs::read_to_string(store.path())
                .unwrap()
                .contains("two-fields")
        );
    }

    #[test]
    fn export_all_and_selected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, 100, 90);
        let a = entry("2024-01-01 10:00:00", "a");
        let b = entry("2024-01-01 10:00:01", "b");
        store.append(&a).unwrap();
        store.append(&b).unwrap();

        let all_path = dir.path().join("all.txt");
        assert_eq!(store.export(&all_path, None).unwrap(), 2);
        let raw = fs::read_to_string(&all_path).unwrap();
        assert!(raw.contains("| a |") && raw.contains("| b |"));

        let sel_path = dir.path().join("sel.txt");
        assert_eq!(store.export(&sel_path, Some(&ids(&[b]))).unwrap(), 1);
        let raw = fs::read_to_string(&sel_path).unwrap();
        assert!(!raw.contains("| a |") && raw.contains("| b |"));
    }
}
