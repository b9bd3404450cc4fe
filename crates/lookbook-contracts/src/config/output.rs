use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchVariety {
    SubtleVariations,
    DynamicAngles,
}

impl BatchVariety {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SubtleVariations => "subtle_variations",
            Self::DynamicAngles => "dynamic_angles",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "subtle" | "subtle_variations" => Some(Self::SubtleVariations),
            "dynamic" | "dynamic_angles" => Some(Self::DynamicAngles),
            _ => None,
        }
    }
}

/// Output resolution tier requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl Quality {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OneK => "1K",
            Self::TwoK => "2K",
            Self::FourK => "4K",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1k" => Some(Self::OneK),
            "2k" => Some(Self::TwoK),
            "4k" => Some(Self::FourK),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    pub count: u32,
    pub batch_variety: BatchVariety,
    pub quality: Quality,
    pub aspect_ratio: String,
    pub platform_preset: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            count: 2,
            batch_variety: BatchVariety::SubtleVariations,
            quality: Quality::FourK,
            aspect_ratio: "4:5".to_string(),
            platform_preset: "Instagram Portrait (4:5)".to_string(),
        }
    }
}

impl OutputSettings {
    /// Shallow merge: fields present in the update replace the current
    /// values, everything else is kept. No cross-field coupling happens here.
    pub fn merged(&self, update: OutputUpdate) -> Self {
        Self {
            count: update.count.unwrap_or(self.count),
            batch_variety: update.batch_variety.unwrap_or(self.batch_variety),
            quality: update.quality.unwrap_or(self.quality),
            aspect_ratio: update.aspect_ratio.unwrap_or_else(|| self.aspect_ratio.clone()),
            platform_preset: update
                .platform_preset
                .unwrap_or_else(|| self.platform_preset.clone()),
        }
    }
}

/// Partial update for the output settings; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputUpdate {
    pub count: Option<u32>,
    pub batch_variety: Option<BatchVariety>,
    pub quality: Option<Quality>,
    pub aspect_ratio: Option<String>,
    pub platform_preset: Option<String>,
}

impl OutputUpdate {
    /// The preset/ratio coupling lives at the call site, not in the store:
    /// selecting a preset produces an update that sets both fields together.
    pub fn for_preset(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        let (preset, ratio) = platform_presets()
            .into_iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(trimmed))?;
        Some(Self {
            platform_preset: Some(preset.to_string()),
            aspect_ratio: Some(ratio.to_string()),
            ..Self::default()
        })
    }
}

/// Named platform presets and the aspect ratio each one implies, in the
/// order the builder lists them.
pub fn platform_presets() -> IndexMap<&'static str, &'static str> {
    IndexMap::from([
        ("Instagram Portrait (4:5)", "4:5"),
        ("Instagram Story (9:16)", "9:16"),
        ("Instagram Square (1:1)", "1:1"),
        ("Default (2:3)", "2:3"),
    ])
}

pub fn aspect_ratio_for_preset(name: &str) -> Option<&'static str> {
    let trimmed = name.trim();
    platform_presets()
        .into_iter()
        .find(|(preset, _)| preset.eq_ignore_ascii_case(trimmed))
        .map(|(_, ratio)| ratio)
}
