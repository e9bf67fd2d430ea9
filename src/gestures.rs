use std::collections::HashMap;

use anyhow::{Result, anyhow};

/// The five recognized hand poses plus the no-gesture sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureLabel {
    One,
    Two,
    Three,
    Four,
    ThumbUp,
    Unknown,
}

impl GestureLabel {
    /// Answer-option index for the numeric gestures (ONE→0 … FOUR→3).
    pub fn option_index(self) -> Option<usize> {
        match self {
            Self::One => Some(0),
            Self::Two => Some(1),
            Self::Three => Some(2),
            Self::Four => Some(3),
            Self::ThumbUp | Self::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::One => "one",
            Self::Two => "two",
            Self::Three => "three",
            Self::Four => "four",
            Self::ThumbUp => "thumb_up",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "one" => Ok(Self::One),
            "two" => Ok(Self::Two),
            "three" => Ok(Self::Three),
            "four" => Ok(Self::Four),
            "thumb_up" => Ok(Self::ThumbUp),
            other => Err(anyhow!("unknown gesture name: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub label: String,
    pub score: f32,
}

/// Per-frame classifier output, ranked by confidence descending.
#[derive(Debug, Clone, Default)]
pub struct ClassifierFrameResult {
    pub candidates: Vec<Candidate>,
}

impl ClassifierFrameResult {
    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

/// Classifier label string → gesture table, loaded from the active profile.
#[derive(Debug, Clone)]
pub struct LabelMap {
    map: HashMap<String, GestureLabel>,
}

impl LabelMap {
    pub fn from_table(table: &HashMap<String, String>) -> Result<Self> {
        let mut map = HashMap::new();
        for (label, name) in table {
            if label.trim().is_empty() {
                return Err(anyhow!("empty classifier label in [labels]"));
            }
            map.insert(label.clone(), GestureLabel::parse(name)?);
        }
        if map.is_empty() {
            return Err(anyhow!("[labels] table must not be empty"));
        }
        Ok(Self { map })
    }

    pub fn resolve(&self, label: &str) -> GestureLabel {
        self.map.get(label).copied().unwrap_or(GestureLabel::Unknown)
    }
}

impl Default for LabelMap {
    /// The pretrained recognizer's canonical vocabulary.
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert("Closed_Fist".to_string(), GestureLabel::One);
        map.insert("Victory".to_string(), GestureLabel::Two);
        map.insert("Open_Palm".to_string(), GestureLabel::Three);
        map.insert("ILoveYou".to_string(), GestureLabel::Four);
        map.insert("Thumb_Up".to_string(), GestureLabel::ThumbUp);
        Self { map }
    }
}

/// Collapse one frame's classifier output into a single gesture value.
///
/// Unknown when no hands were detected or the top score does not clear the
/// confidence threshold; unmapped labels also resolve to Unknown.
pub fn derive_gesture(
    result: &ClassifierFrameResult,
    labels: &LabelMap,
    min_confidence: f32,
) -> GestureLabel {
    match result.top() {
        Some(top) if top.score > min_confidence => labels.resolve(&top.label),
        _ => GestureLabel::Unknown,
    }
}
