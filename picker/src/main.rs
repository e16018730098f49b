// picker/src/main.rs
use clipkeep::{
    ClipboardWatcher, Command as WatchCommand, Config, EntryId, HistoryStore, NullReader, TagMode,
    view,
};
use crux_core::Core;
use eframe::egui;
use picker::{Effect, Event, Model, PickerApp, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const RELOAD_EVERY: Duration = Duration::from_secs(1);

struct PickerGui {
    core: Core<PickerApp>,
    model: Model,
    store: Arc<HistoryStore>,
    watch_tx: mpsc::Sender<WatchCommand>,
    config: Config,
    tag_input: String,
    last_reload: Instant,
}

impl PickerGui {
    fn new(cc: &eframe::CreationContext<'_>) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        let config = Config::load().expect("failed to load config");
        let store =
            Arc::new(HistoryStore::from_config(&config).expect("failed to open history store"));

        // capture daemon runs in-process on its own runtime thread
        let mut watcher = ClipboardWatcher::new(store.clone(), Arc::new(NullReader), &config)
            .expect("failed to initialize clipboard watcher");
        let watch_tx = watcher.sender();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
            rt.block_on(async move {
                if let Err(e) = watcher.run().await {
                    log::error!("clipboard watcher stopped: {e:#}");
                }
            });
        });

        let mut app = Self {
            core: Core::new(),
            model: Model::default(),
            store,
            watch_tx,
            config,
            tag_input: String::new(),
            last_reload: Instant::now(),
        };
        app.reload_rows();
        app
    }

    fn process_event(&mut self, event: Event) {
        let effects = self.core.process_event(event);
        for effect in effects {
            match effect {
                Effect::Render(_) => {
                    // egui repaints on its own schedule
                }
            }
        }
        self.model = self.core.view();
    }

    fn reload_rows(&mut self) {
        match self.store.load_all() {
            Ok(entries) => {
                let rows: Vec<Row> = view::rows(&entries, self.config.preview_chars)
                    .into_iter()
                    .map(|row| Row {
                        id: row.id.to_string(),
                        timestamp: row.timestamp,
                        preview: row.preview,
                        tags: row.tags,
                    })
                    .collect();
                self.process_event(Event::RowsLoaded(rows));
            }
            Err(e) => {
                self.process_event(Event::Status(format!("failed to load history: {e:#}")));
            }
        }
        if let Some(count) = self.store.take_pending_warning() {
            self.process_event(Event::CapacityWarning(count));
        }
        self.last_reload = Instant::now();
    }

    fn selected_entry_ids(&self) -> Vec<EntryId> {
        self.model
            .selected_ids()
            .into_iter()
            .map(EntryId::from_hex)
            .collect()
    }

    fn copy_selected(&mut self) {
        let ids = self.selected_entry_ids();
        if ids.is_empty() {
            self.process_event(Event::Status("select at least one entry".to_string()));
            return;
        }
        let count = ids.len();
        match self.watch_tx.blocking_send(WatchCommand::Copy(ids)) {
            Ok(()) => self.process_event(Event::Copied(count)),
            Err(_) => {
                self.process_event(Event::Status("clipboard watcher is not running".to_string()))
            }
        }
    }

    fn mutate_tags(&mut self, mode: TagMode) {
        let ids: HashSet<EntryId> = self.selected_entry_ids().into_iter().collect();
        if ids.is_empty() {
            self.process_event(Event::Status("select at least one entry".to_string()));
            return;
        }
        let tags = self.tag_input.trim().to_string();
        if tags.is_empty() {
            self.process_event(Event::Status("enter one or more tags first".to_string()));
            return;
        }
        match self.store.update_tags(&ids, &tags, mode) {
            Ok(updated) => {
                self.process_event(Event::TagsUpdated(updated));
                self.reload_rows();
            }
            Err(e) => self.process_event(Event::Status(format!("tag update failed: {e:#}"))),
        }
    }

    fn delete_selected(&mut self) {
        let ids: HashSet<EntryId> = self.selected_entry_ids().into_iter().collect();
        if ids.is_empty() {
            self.process_event(Event::Status("select at least one entry".to_string()));
            return;
        }
        match self.store.delete(&ids) {
            Ok(removed) => {
                self.process_event(Event::Deleted(removed));
                self.reload_rows();
            }
            Err(e) => self.process_event(Event::Status(format!("delete failed: {e:#}"))),
        }
    }

    fn clear_history(&mut self) {
        match self.store.clear() {
            Ok(()) => {
                self.process_event(Event::Cleared);
                self.reload_rows();
            }
            Err(e) => self.process_event(Event::Status(format!("clear failed: {e:#}"))),
        }
    }

    fn export(&mut self, selected_only: bool) {
        let selection: Option<HashSet<EntryId>> = if selected_only {
            let ids: HashSet<EntryId> = self.selected_entry_ids().into_iter().collect();
            if ids.is_empty() {
                self.process_event(Event::Status("select at least one entry".to_string()));
                return;
            }
            Some(ids)
        } else {
            None
        };

        let file_name = format!(
            "clipboard_export_{}.txt",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        match self.store.export(Path::new(&file_name), selection.as_ref()) {
            Ok(exported) => self.process_event(Event::Exported(exported)),
            Err(e) => self.process_event(Event::Status(format!("export failed: {e:#}"))),
        }
    }
}

impl eframe::App for PickerGui {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        if self.last_reload.elapsed() >= RELOAD_EVERY {
            self.reload_rows();
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(warning) = self.model.capacity_warning.clone() {
                ui.horizontal(|ui| {
                    ui.colored_label(egui::Color32::YELLOW, warning);
                    if ui.button("Export All").clicked() {
                        self.export(false);
                    }
                    if ui.button("Dismiss").clicked() {
                        self.store.reset_warning();
                        self.process_event(Event::DismissWarning);
                    }
                });
                ui.separator();
            }

            ui.horizontal(|ui| {
                ui.label("Search:");
                let response = ui.text_edit_singleline(&mut self.model.search_query);
                if response.changed() {
                    self.process_event(Event::UpdateSearch(self.model.search_query.clone()));
                }

                ui.label(format!(
                    "{}/{}",
                    self.model.filtered_rows().len(),
                    self.model.rows.len()
                ));

                if ui.button("⟳").clicked() {
                    self.reload_rows();
                }
            });

            ui.horizontal(|ui| {
                ui.label("Tags:");
                ui.text_edit_singleline(&mut self.tag_input);
                if ui.button("Add Tag").clicked() {
                    self.mutate_tags(TagMode::Add);
                }
                if ui.button("Modify Tags").clicked() {
                    self.mutate_tags(TagMode::Replace);
                }
            });

            ui.horizontal(|ui| {
                if ui.button("Copy Selected").clicked() {
                    self.copy_selected();
                }
                if ui.button("Delete Selected").clicked() {
                    self.delete_selected();
                }
                if ui.button("Export Selected").clicked() {
                    self.export(true);
                }
                if ui.button("Export All").clicked() {
                    self.export(false);
                }
                if ui.button("Clear History").clicked() {
                    self.clear_history();
                }
            });

            ui.separator();

            let rows = self.model.filtered_rows();
            egui::ScrollArea::vertical().show(ui, |ui| {
                for (index, row) in rows.iter().enumerate() {
                    let is_selected = self.model.selected.contains(&index);
                    let label = if row.tags.is_empty() {
                        format!("{}  {}", row.timestamp, row.preview)
                    } else {
                        format!("{}  {}  [{}]", row.timestamp, row.preview, row.tags)
                    };

                    if ui.selectable_label(is_selected, label).clicked() {
                        self.process_event(Event::ToggleSelect(index));
                    }
                }
            });

            if !self.model.status.is_empty() {
                ui.separator();
                ui.label(self.model.status.clone());
            }
        });

        ctx.request_repaint_after(RELOAD_EVERY);
    }
}

fn main() -> Result<(), eframe::Error> {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([900.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Picker",
        options,
        Box::new(|cc| Ok(Box::new(PickerGui::new(cc)))),
    )
}
