use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::{Item, ItemDraft, Section};
use super::output::{OutputSettings, OutputUpdate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub job_id: String,
}

/// The whole session configuration: one job id, four ordered item
/// collections, and the output settings. Insertion order inside a section is
/// meaningful; it drives builder numbering and image-reference numbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShootConfig {
    pub meta: Meta,
    #[serde(default)]
    pub model: Vec<Item>,
    #[serde(default)]
    pub outfits: Vec<Item>,
    #[serde(default)]
    pub accessories: Vec<Item>,
    #[serde(default)]
    pub environment: Vec<Item>,
    #[serde(default)]
    pub output: OutputSettings,
}

impl ShootConfig {
    pub fn new() -> Self {
        Self {
            meta: Meta {
                job_id: new_job_id(),
            },
            model: Vec::new(),
            outfits: Vec::new(),
            accessories: Vec::new(),
            environment: Vec::new(),
            output: OutputSettings::default(),
        }
    }

    pub fn section(&self, section: Section) -> &[Item] {
        match section {
            Section::Model => &self.model,
            Section::Outfits => &self.outfits,
            Section::Accessories => &self.accessories,
            Section::Environment => &self.environment,
        }
    }

    pub(crate) fn section_mut(&mut self, section: Section) -> &mut Vec<Item> {
        match section {
            Section::Model => &mut self.model,
            Section::Outfits => &mut self.outfits,
            Section::Accessories => &mut self.accessories,
            Section::Environment => &mut self.environment,
        }
    }

    pub fn total_items(&self) -> usize {
        Section::ALL
            .iter()
            .map(|section| self.section(*section).len())
            .sum()
    }
}

impl Default for ShootConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque correlation token for one builder session, `job_` plus the first
/// segment of a v4 uuid. Fresh on creation and on every reset.
pub fn new_job_id() -> String {
    let raw = Uuid::new_v4().to_string();
    let head = raw.split('-').next().unwrap_or(raw.as_str());
    format!("job_{head}")
}

fn new_item_id() -> String {
    Uuid::new_v4().to_string()
}

/// One mutation of the configuration. Ids are generated by the store before
/// an action is built, so `apply` itself stays pure.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigAction {
    AddItem { section: Section, item: Item },
    RemoveItem { section: Section, id: String },
    UpdateOutput(OutputUpdate),
    Reset { job_id: String },
}

/// Pure reducer: old configuration + action -> new configuration.
pub fn apply(config: ShootConfig, action: ConfigAction) -> ShootConfig {
    let mut next = config;
    match action {
        ConfigAction::AddItem { section, item } => {
            next.section_mut(section).push(item);
        }
        ConfigAction::RemoveItem { section, id } => {
            next.section_mut(section).retain(|item| item.id != id);
        }
        ConfigAction::UpdateOutput(update) => {
            next.output = next.output.merged(update);
        }
        ConfigAction::Reset { job_id } => {
            next = ShootConfig {
                meta: Meta { job_id },
                ..ShootConfig::new()
            };
        }
    }
    next
}

/// In-memory session state container. All mutations run through the
/// [`apply`] reducer; methods only generate ids and dispatch actions.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigStore {
    config: ShootConfig,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            config: ShootConfig::new(),
        }
    }

    /// Adopt an existing configuration, e.g. one loaded from disk.
    pub fn from_config(config: ShootConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShootConfig {
        &self.config
    }

    /// Appends the draft to the section with a freshly assigned unique id and
    /// returns that id. Structurally identical items may coexist.
    pub fn add_item(&mut self, section: Section, draft: ItemDraft) -> String {
        let item = Item {
            id: new_item_id(),
            kind: draft.kind,
            text: draft.text,
            strength: draft.strength,
            reference_image_url: draft.reference_image_url,
            reference_image_urls: draft.reference_image_urls,
            reference_image: None,
            reference_images: None,
        };
        let id = item.id.clone();
        self.dispatch(ConfigAction::AddItem { section, item });
        id
    }

    /// Removes the item with the given id. Silently a no-op when no item
    /// matches; survivors keep their ids and relative order.
    pub fn remove_item(&mut self, section: Section, id: &str) {
        self.dispatch(ConfigAction::RemoveItem {
            section,
            id: id.to_string(),
        });
    }

    pub fn update_output(&mut self, update: OutputUpdate) {
        self.dispatch(ConfigAction::UpdateOutput(update));
    }

    /// Wholesale replacement: empty collections, default output settings and
    /// a job id never used before in this session.
    pub fn reset(&mut self) {
        self.dispatch(ConfigAction::Reset {
            job_id: new_job_id(),
        });
    }

    fn dispatch(&mut self, action: ConfigAction) {
        self.config = apply(self.config.clone(), action);
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}
