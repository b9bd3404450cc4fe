mod item;
mod output;
mod payload;
mod store;

pub use item::{Item, ItemDraft, ItemKind, Section, MODEL_ANGLE_SLOTS};
pub use output::{
    aspect_ratio_for_preset, platform_presets, BatchVariety, OutputSettings, OutputUpdate, Quality,
};
pub use payload::build_generation_payload;
pub use store::{apply, new_job_id, ConfigAction, ConfigStore, Meta, ShootConfig};
