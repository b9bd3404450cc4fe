use serde::{Deserialize, Serialize};

/// Fixed slot labels for the six-angle model reference set, in slot order.
pub const MODEL_ANGLE_SLOTS: [&str; 6] = [
    "Front face",
    "Left side (90 degree)",
    "Right side (90 degree)",
    "Slightly turned left (45 degree)",
    "Slightly turned right (45 degree)",
    "Body figure",
];

/// Closed set of configurable item types. The serde labels are the wire
/// strings the generation backend keys its prompt assembly on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    #[serde(rename = "Face (5 Angles) & Body")]
    FaceAnglesAndBody,
    #[serde(rename = "Face & Body")]
    FaceAndBody,
    Hair,
    Pose,
    Dress,
    Top,
    Bottom,
    Jacket,
    Coat,
    Shirt,
    Pants,
    Skirt,
    Sweater,
    Shoes,
    Necklace,
    Earrings,
    Ring,
    Bracelet,
    Watch,
    Belt,
    Bag,
    Hat,
    Scarf,
    Sunglasses,
    Background,
    Aesthetic,
    Framing,
    Lighting,
    Shadows,
    Theme,
    Other,
}

impl ItemKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FaceAnglesAndBody => "Face (5 Angles) & Body",
            Self::FaceAndBody => "Face & Body",
            Self::Hair => "Hair",
            Self::Pose => "Pose",
            Self::Dress => "Dress",
            Self::Top => "Top",
            Self::Bottom => "Bottom",
            Self::Jacket => "Jacket",
            Self::Coat => "Coat",
            Self::Shirt => "Shirt",
            Self::Pants => "Pants",
            Self::Skirt => "Skirt",
            Self::Sweater => "Sweater",
            Self::Shoes => "Shoes",
            Self::Necklace => "Necklace",
            Self::Earrings => "Earrings",
            Self::Ring => "Ring",
            Self::Bracelet => "Bracelet",
            Self::Watch => "Watch",
            Self::Belt => "Belt",
            Self::Bag => "Bag",
            Self::Hat => "Hat",
            Self::Scarf => "Scarf",
            Self::Sunglasses => "Sunglasses",
            Self::Background => "Background",
            Self::Aesthetic => "Aesthetic",
            Self::Framing => "Framing",
            Self::Lighting => "Lighting",
            Self::Shadows => "Shadows",
            Self::Theme => "Theme",
            Self::Other => "Other",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        Section::ALL
            .iter()
            .flat_map(|section| section.allowed_kinds().iter())
            .copied()
            .find(|kind| kind.label().eq_ignore_ascii_case(trimmed))
    }

    /// Types whose weight slider is meaningful (pose and garment strength).
    pub fn supports_strength(&self) -> bool {
        matches!(self, Self::Pose | Self::Dress | Self::Top | Self::Bottom)
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One of the four addressable item collections. `meta` and `output` are
/// deliberately not sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Model,
    Outfits,
    Accessories,
    Environment,
}

impl Section {
    /// Fixed iteration order; the payload transformer numbers image
    /// references in this order.
    pub const ALL: [Section; 4] = [
        Section::Model,
        Section::Outfits,
        Section::Accessories,
        Section::Environment,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Outfits => "outfits",
            Self::Accessories => "accessories",
            Self::Environment => "environment",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|section| section.key() == normalized)
    }

    /// Item types the builder UI offers for this section. Advisory only;
    /// the store itself accepts any kind in any section.
    pub fn allowed_kinds(&self) -> &'static [ItemKind] {
        match self {
            Self::Model => &[
                ItemKind::FaceAnglesAndBody,
                ItemKind::FaceAndBody,
                ItemKind::Hair,
                ItemKind::Pose,
            ],
            Self::Outfits => &[
                ItemKind::Dress,
                ItemKind::Top,
                ItemKind::Bottom,
                ItemKind::Jacket,
                ItemKind::Coat,
                ItemKind::Shirt,
                ItemKind::Pants,
                ItemKind::Skirt,
                ItemKind::Sweater,
                ItemKind::Shoes,
                ItemKind::Other,
            ],
            Self::Accessories => &[
                ItemKind::Necklace,
                ItemKind::Earrings,
                ItemKind::Ring,
                ItemKind::Bracelet,
                ItemKind::Watch,
                ItemKind::Belt,
                ItemKind::Bag,
                ItemKind::Hat,
                ItemKind::Scarf,
                ItemKind::Sunglasses,
                ItemKind::Other,
            ],
            Self::Environment => &[
                ItemKind::Background,
                ItemKind::Aesthetic,
                ItemKind::Framing,
                ItemKind::Lighting,
                ItemKind::Shadows,
                ItemKind::Theme,
            ],
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// One configurable reference within a section.
///
/// `reference_image` / `reference_images` stay `None` in stored state; the
/// payload transformer fills them on a copy just before submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default)]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_images: Option<Vec<String>>,
}

impl Item {
    /// How many reference images the item carries, as shown in the builder
    /// listing: the multi-angle list wins over the single slot.
    pub fn image_count(&self) -> usize {
        match &self.reference_image_urls {
            Some(urls) => urls.len(),
            None => usize::from(
                self.reference_image_url
                    .as_deref()
                    .is_some_and(|url| !url.is_empty()),
            ),
        }
    }

    /// Submit-gate check: an item should carry a description or at least one
    /// image. Not enforced by the store.
    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty() || self.image_count() > 0
    }
}

/// An item as entered in the builder, before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub kind: ItemKind,
    pub text: String,
    pub strength: Option<f64>,
    pub reference_image_url: Option<String>,
    pub reference_image_urls: Option<Vec<String>>,
}

impl ItemDraft {
    pub fn new(kind: ItemKind) -> Self {
        Self {
            kind,
            text: String::new(),
            strength: None,
            reference_image_url: None,
            reference_image_urls: None,
        }
    }
}
