//! Flat-file clipboard history: a polling capture daemon, a line-per-entry
//! tagged log, and the read/mutate operations a picker UI needs.

pub mod config;
pub mod entry;
pub mod extract;
pub mod store;
pub mod view;
pub mod watch;

pub use config::Config;
pub use entry::{EntryId, HistoryEntry};
pub use extract::{ContentKind, DocumentReader, NullReader};
pub use store::{CapacityCheck, HistoryStore, TagMode};
pub use view::{ViewRow, filter_rows, rows};
pub use watch::{ClipboardWatcher, Command, EchoGuard, IngestOutcome, ingest};
