use serde::{Deserialize, Serialize};

/// One inference result: the winning label, its position in the vocabulary,
/// and the full per-label probability distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub index: usize,
    pub probabilities: Vec<f32>,
}

/// A single row of the ranked probability panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLabel {
    pub label: String,
    pub probability: f32,
}

impl RankedLabel {
    /// Display form used by the probability panel, e.g. `75.00%`.
    pub fn percent(&self) -> String {
        format!("{:.2}%", self.probability * 100.0)
    }
}

/// Resolved content for one label, bounded to at most three items per
/// category. An all-empty bundle is a valid outcome for unmapped labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBundle {
    pub texts: Vec<String>,
    pub images: Vec<String>,
    pub videos: Vec<String>,
}

impl ContentBundle {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.images.is_empty() && self.videos.is_empty()
    }
}

/// A video link plus its derived thumbnail, when an identifier could be
/// extracted from the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoReference {
    pub original_url: String,
    pub thumbnail_url: Option<String>,
}

/// The content panel handed to the rendering layer: texts and image locators
/// verbatim, video URLs upgraded to `VideoReference`s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelContent {
    pub texts: Vec<String>,
    pub images: Vec<String>,
    pub videos: Vec<VideoReference>,
}

impl LabelContent {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.images.is_empty() && self.videos.is_empty()
    }
}

/// Everything one successful pipeline run produces for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyOutcome {
    pub predicted_label: String,
    pub ranked: Vec<RankedLabel>,
    pub content: LabelContent,
}
