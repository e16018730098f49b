use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clipkeep::{ClipboardWatcher, Config, HistoryStore, NullReader, TagMode, view};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use zeroize::Zeroize;

#[derive(Parser)]
#[command(name = "clipkeep")]
#[command(version = "0.1.0")]
#[command(about = "flat-file clipboard history with tags")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the clipboard and record every change
    Watch,
    /// Print history, newest first
    List {
        /// Case-insensitive filter across timestamp, preview and tags
        #[arg(long)]
        filter: Option<String>,
    },
    /// Copy entries back to the clipboard by id prefix
    Copy {
        /// Entry id prefixes (at least 8 characters)
        ids: Vec<String>,
    },
    /// Add tags to entries, or replace their tags outright
    Tag {
        /// Entry id prefixes
        ids: Vec<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: String,
        /// Replace existing tags instead of merging
        #[arg(long)]
        replace: bool,
    },
    /// Delete entries by id prefix
    Delete {
        /// Entry id prefixes
        ids: Vec<String>,
    },
    /// Clear the entire history
    Clear,
    /// Export history to a file
    Export {
        path: PathBuf,
        /// Export only these id prefixes instead of everything
        #[arg(long)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::load().context("failed to load configuration")?;
    let store = Arc::new(HistoryStore::from_config(&config)?);

    match cli.command {
        Commands::Watch => {
            // platform-specific display check
            #[cfg(target_os = "linux")]
            {
                if std::env::var("DISPLAY").is_err() && std::env::var("WAYLAND_DISPLAY").is_err() {
                    bail!("no display server available (neither X11 nor Wayland)");
                }
            }

            let mut watcher = ClipboardWatcher::new(store, Arc::new(NullReader), &config)?;
            tokio::select! {
                result = watcher.run() => result?,
                _ = signal::ctrl_c() => {
                    println!("\nshutting down");
                }
            }
        }
        Commands::List { filter } => {
            let entries = store.load_all()?;
            let all = view::rows(&entries, config.preview_chars);
            let rows = match filter {
                Some(query) => view::filter_rows(&all, &query),
                None => all,
            };
            for row in rows {
                println!(
                    "{}  {} | {} | {}",
                    row.id.short(),
                    row.timestamp,
                    row.preview,
                    row.tags
                );
            }
        }
        Commands::Copy { ids } => {
            let targets = resolve_ids(&store, &ids)?;
            let entries = store.load_all()?;
            let contents: Vec<String> = entries
                .iter()
                .filter(|e| targets.contains(&e.id()))
                .map(|e| e.content.clone())
                .collect();
            if contents.is_empty() {
                bail!("no matching entries to copy");
            }

            let copied = contents.len();
            let mut payload = contents.join("\n\n---\n\n");
            // a running watch daemon will see this write and skip it as a
            // duplicate of the stored content
            let mut clipboard =
                arboard::Clipboard::new().context("failed to initialize clipboard")?;
            clipboard.set_text(payload.clone())?;
            payload.zeroize();
            println!("copied {copied} entr{} to clipboard", plural(copied));
        }
        Commands::Tag { ids, tags, replace } => {
            let targets = resolve_ids(&store, &ids)?;
            let mode = if replace { TagMode::Replace } else { TagMode::Add };
            let updated = store.update_tags(&targets, &tags, mode)?;
            if updated == 0 {
                println!("no entries updated");
            } else {
                println!("updated tags on {updated} entr{}", plural(updated));
            }
        }
        Commands::Delete { ids } => {
            let targets = resolve_ids(&store, &ids)?;
            let removed = store.delete(&targets)?;
            println!("deleted {removed} entr{}", plural(removed));
        }
        Commands::Clear => {
            store.clear()?;
            println!("clipboard history cleared");
        }
        Commands::Export { path, ids } => {
            let selection = if ids.is_empty() {
                None
            } else {
                Some(resolve_ids(&store, &ids)?)
            };
            let exported = store.export(&path, selection.as_ref())?;
            println!(
                "exported {exported} entr{} to {}",
                plural(exported),
                path.display()
            );
        }
    }

    Ok(())
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "y" } else { "ies" }
}

// Resolve id prefixes against the stored log. A prefix matching several
// distinct entries is ambiguous; identical lines share one id and resolve
// together.
fn resolve_ids(store: &HistoryStore, prefixes: &[String]) -> Result<HashSet<clipkeep::EntryId>> {
    if prefixes.is_empty() {
        bail!("no entry ids given");
    }
    let entries = store.load_all()?;
    let mut resolved = HashSet::new();
    for prefix in prefixes {
        let matches: HashSet<clipkeep::EntryId> = entries
            .iter()
            .map(|e| e.id())
            .filter(|id| id.as_str().starts_with(prefix.as_str()))
            .collect();
        match matches.len() {
            0 => bail!("no entry matches id prefix {prefix}"),
            1 => resolved.extend(matches),
            _ => bail!("entry id prefix {prefix} is ambiguous"),
        }
    }
    Ok(resolved)
}
