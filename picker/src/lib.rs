// picker/src/lib.rs
use crux_core::macros::Effect;
use crux_core::{App, Command, render::Render};
use serde::{Deserialize, Serialize};

/// One displayed history row, as the shell read it from the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Row {
    pub id: String,
    pub timestamp: String,
    pub preview: String,
    pub tags: String,
}

impl Row {
    fn matches(&self, query: &str) -> bool {
        self.timestamp.to_lowercase().contains(query)
            || self.preview.to_lowercase().contains(query)
            || self.tags.to_lowercase().contains(query)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Model {
    pub rows: Vec<Row>,
    pub search_query: String,
    /// Indices into the filtered row list.
    pub selected: Vec<usize>,
    pub status: String,
    pub capacity_warning: Option<String>,
}

impl Model {
    /// Rows passing the current search query, newest first.
    pub fn filtered_rows(&self) -> Vec<Row> {
        if self.search_query.is_empty() {
            self.rows.clone()
        } else {
            let query = self.search_query.to_lowercase();
            self.rows
                .iter()
                .filter(|row| row.matches(&query))
                .cloned()
                .collect()
        }
    }

    /// Ids of the selected rows, in selection order.
    pub fn selected_ids(&self) -> Vec<String> {
        let filtered = self.filtered_rows();
        self.selected
            .iter()
            .filter_map(|&index| filtered.get(index).map(|row| row.id.clone()))
            .collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum Event {
    RowsLoaded(Vec<Row>),
    UpdateSearch(String),
    ToggleSelect(usize),
    ClearSelection,
    Copied(usize),
    TagsUpdated(usize),
    Deleted(usize),
    Cleared,
    Exported(usize),
    CapacityWarning(usize),
    DismissWarning,
    Status(String),
}

#[derive(Effect)]
pub struct Capabilities {
    render: Render<Event>,
}

#[derive(Default)]
pub struct PickerApp;

impl App for PickerApp {
    type Event = Event;
    type Model = Model;
    type ViewModel = Model;
    type Capabilities = Capabilities;
    type Effect = Effect;

    fn update(
        &self,
        event: Self::Event,
        model: &mut Self::Model,
        caps: &Self::Capabilities,
    ) -> Command<Self::Effect, Self::Event> {
        match event {
            Event::RowsLoaded(rows) => {
                // selection indices go stale when the data changes
                if rows != model.rows {
                    model.rows = rows;
                    model.selected.clear();
                }
            }
            Event::UpdateSearch(query) => {
                model.search_query = query;
                model.selected.clear();
            }
            Event::ToggleSelect(index) => {
                if index < model.filtered_rows().len() {
                    if let Some(position) = model.selected.iter().position(|&i| i == index) {
                        model.selected.remove(position);
                    } else {
                        model.selected.push(index);
                    }
                }
            }
            Event::ClearSelection => {
                model.selected.clear();
            }
            Event::Copied(count) => {
                model.status = format!("copied {count} entr{} to clipboard", plural(count));
            }
            Event::TagsUpdated(count) => {
                model.status = if count == 0 {
                    "no entries updated".to_string()
                } else {
                    format!("updated tags on {count} entr{}", plural(count))
                };
            }
            Event::Deleted(count) => {
                model.status = format!("deleted {count} entr{}", plural(count));
            }
            Event::Cleared => {
                model.status = "history cleared".to_string();
            }
            Event::Exported(count) => {
                model.status = format!("exported {count} entr{}", plural(count));
            }
            Event::CapacityWarning(count) => {
                model.capacity_warning = Some(format!(
                    "history is at {count} entries; export now to keep older entries"
                ));
            }
            Event::DismissWarning => {
                model.capacity_warning = None;
            }
            Event::Status(message) => {
                model.status = message;
            }
        }

        caps.render.render();
        Command::done()
    }

    fn view(&self, model: &Self::Model) -> Self::ViewModel {
        model.clone()
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "y" } else { "ies" }
}
