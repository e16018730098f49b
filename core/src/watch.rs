use crate::config::Config;
use crate::entry::{self, EntryId, HistoryEntry};
use crate::extract::{self, DocumentReader};
use crate::store::{CapacityCheck, HistoryStore};
use anyhow::{Context, Result, bail};
use arboard::Clipboard;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use zeroize::Zeroize;

const COMMAND_QUEUE: usize = 16;
const COPY_JOINER: &str = "\n\n---\n\n";

/// Consume-once suppression flag for the app's own clipboard writes.
///
/// Two states: armed and clear. The next clipboard observation after arming
/// consumes the flag instead of ingesting, which stops the copy-back action
/// from echoing into the history. If several change notifications land
/// between arming and the next observation, only the first is suppressed;
/// the rest are caught downstream by the duplicate scan. Known single-flag
/// limitation, kept as-is.
#[derive(Debug, Default)]
pub struct EchoGuard {
    suppressed: AtomicBool,
}

impl EchoGuard {
    pub fn arm(&self) {
        self.suppressed.store(true, Ordering::SeqCst);
    }

    /// True at most once per arm; clears the flag.
    pub fn consume(&self) -> bool {
        self.suppressed.swap(false, Ordering::SeqCst)
    }

    pub fn is_armed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }
}

/// In-process requests handled by the watcher loop between poll ticks.
#[derive(Debug)]
pub enum Command {
    /// Copy the matching entries back to the system clipboard.
    Copy(Vec<EntryId>),
    Delete(Vec<EntryId>),
    Clear,
    Exit,
}

/// What happened to one raw clipboard payload fed through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored {
        id: EntryId,
        capacity: CapacityCheck,
    },
    Duplicate,
    Empty,
}

/// Full ingest pipeline: extract, sanitize, duplicate scan, append,
/// capacity check. Shared by the poll tick and any toolkit change signal.
pub fn ingest(
    store: &HistoryStore,
    reader: &dyn DocumentReader,
    raw: &str,
) -> Result<IngestOutcome> {
    let extracted = extract::extract(raw, reader);
    let content = entry::sanitize(&extracted);
    if content.trim().is_empty() {
        return Ok(IngestOutcome::Empty);
    }
    if store.is_duplicate(&content)? {
        debug!("duplicate clipboard entry detected, skipping");
        return Ok(IngestOutcome::Duplicate);
    }

    let entry = HistoryEntry::captured_now(content);
    store.append(&entry)?;
    let capacity = store.enforce_capacity()?;
    Ok(IngestOutcome::Stored {
        id: entry.id(),
        capacity,
    })
}

/// Fixed-interval clipboard poller feeding the ingest pipeline, plus the
/// command loop for copy-back, delete and clear requests from a UI.
pub struct ClipboardWatcher {
    store: Arc<HistoryStore>,
    reader: Arc<dyn DocumentReader + Send + Sync>,
    clipboard: Arc<RwLock<Clipboard>>,
    echo: Arc<EchoGuard>,
    last_seen: Option<String>,
    poll_interval: Duration,
    trim_whitespace: bool,
    command_tx: mpsc::Sender<Command>,
    command_rx: mpsc::Receiver<Command>,
}

impl ClipboardWatcher {
    pub fn new(
        store: Arc<HistoryStore>,
        reader: Arc<dyn DocumentReader + Send + Sync>,
        config: &Config,
    ) -> Result<Self> {
        let clipboard = Clipboard::new().context("failed to initialize clipboard")?;
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);

        Ok(Self {
            store,
            reader,
            clipboard: Arc::new(RwLock::new(clipboard)),
            echo: Arc::new(EchoGuard::default()),
            last_seen: None,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            trim_whitespace: config.trim_whitespace,
            command_tx,
            command_rx,
        })
    }

    pub fn sender(&self) -> mpsc::Sender<Command> {
        self.command_tx.clone()
    }

    pub async fn run(&mut self) -> Result<()> {
        // whatever is on the clipboard at startup predates this session
        self.last_seen = self.sample_clipboard();

        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_clipboard() {
                        error!("clipboard poll failed: {e:#}");
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Copy(ids)) => {
                            if let Err(e) = self.copy_back(&ids) {
                                error!("copy-back failed: {e:#}");
                            }
                        }
                        Some(Command::Delete(ids)) => {
                            let targets: HashSet<EntryId> = ids.into_iter().collect();
                            match self.store.delete(&targets) {
                                Ok(removed) => debug!("command loop deleted {removed} entries"),
                                Err(e) => error!("delete failed: {e:#}"),
                            }
                        }
                        Some(Command::Clear) => {
                            if let Err(e) = self.store.clear() {
                                error!("clear failed: {e:#}");
                            }
                        }
                        Some(Command::Exit) | None => break,
                    }
                }
            }
        }
        Ok(())
    }

    fn poll_clipboard(&mut self) -> Result<()> {
        let Some(raw) = self.sample_clipboard() else {
            return Ok(());
        };

        if self.echo.consume() {
            debug!("suppressed clipboard change caused by our own copy-back");
            self.last_seen = Some(raw);
            return Ok(());
        }

        if self.last_seen.as_deref() == Some(raw.as_str()) {
            return Ok(());
        }
        // last-seen updates whether or not the content turns out to be a
        // duplicate
        self.last_seen = Some(raw.clone());

        match ingest(&self.store, self.reader.as_ref(), &raw)? {
            IngestOutcome::Stored { id, capacity } => {
                info!("captured clipboard entry {}", id.short());
                if let CapacityCheck::NearLimit(count) = capacity {
                    warn!("history is at {count} entries; export soon to retain older entries");
                }
            }
            IngestOutcome::Duplicate => info!("duplicate clipboard entry detected, skipping"),
            IngestOutcome::Empty => {}
        }
        Ok(())
    }

    // Non-blocking read; None when the clipboard is busy or holds no text.
    fn sample_clipboard(&self) -> Option<String> {
        let mut clipboard = self.clipboard.try_write()?;
        let text = clipboard.get_text().ok()?;
        if self.trim_whitespace {
            Some(text.trim().to_string())
        } else {
            Some(text)
        }
    }

    /// Write the selected entries back to the system clipboard, joined with
    /// a separator, arming echo suppression first so the write is not
    /// re-ingested.
    pub fn copy_back(&mut self, ids: &[EntryId]) -> Result<usize> {
        let entries = self.store.load_all()?;
        let mut contents = Vec::new();
        for id in ids {
            if let Some(e) = entries.iter().find(|e| e.id() == *id) {
                contents.push(e.content.clone());
            }
        }
        if contents.is_empty() {
            bail!("no matching entries to copy");
        }

        let copied = contents.len();
        let mut payload = contents.join(COPY_JOINER);

        self.echo.arm();
        let write_result = {
            let mut clipboard = self.clipboard.write();
            clipboard.set_text(payload.clone())
        };
        if let Err(e) = write_result {
            self.echo.consume();
            payload.zeroize();
            return Err(e).context("failed to write to the system clipboard");
        }

        self.last_seen = Some(if self.trim_whitespace {
            payload.trim().to_string()
        } else {
            payload.clone()
        });
        payload.zeroize();
        info!("copied {copied} entries back to the clipboard");
        Ok(copied)
    }
}
