//! The reader's self-assessment used to tailor content.
//!
//! The backend and the stored profile have used several spellings for the
//! same fields over time (`softwareExperience`, `preferred_languages`, ...);
//! [`Background`] accepts all of them and always writes snake_case.

use serde::{Deserialize, Serialize};

/// Self-assessed programming experience.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl ExperienceLevel {
    /// Short description shown under the level picker.
    pub fn description(&self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "Just starting out or learning",
            ExperienceLevel::Intermediate => "Have practical experience",
            ExperienceLevel::Advanced | ExperienceLevel::Expert => "Expert level knowledge",
        }
    }
}

impl std::fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperienceLevel::Beginner => write!(f, "beginner"),
            ExperienceLevel::Intermediate => write!(f, "intermediate"),
            ExperienceLevel::Advanced => write!(f, "advanced"),
            ExperienceLevel::Expert => write!(f, "expert"),
        }
    }
}

impl std::str::FromStr for ExperienceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(ExperienceLevel::Beginner),
            "intermediate" => Ok(ExperienceLevel::Intermediate),
            "advanced" => Ok(ExperienceLevel::Advanced),
            "expert" => Ok(ExperienceLevel::Expert),
            _ => Err(format!("Unknown experience level: {}", s)),
        }
    }
}

/// Self-assessed hardware/systems knowledge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl std::fmt::Display for HardwareLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareLevel::Beginner => write!(f, "beginner"),
            HardwareLevel::Intermediate => write!(f, "intermediate"),
            HardwareLevel::Advanced => write!(f, "advanced"),
        }
    }
}

impl std::str::FromStr for HardwareLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" | "basic" => Ok(HardwareLevel::Beginner),
            "intermediate" => Ok(HardwareLevel::Intermediate),
            "advanced" => Ok(HardwareLevel::Advanced),
            _ => Err(format!("Unknown hardware level: {}", s)),
        }
    }
}

/// Duplicate-free multi-select, kept in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SelectionSet(Vec<String>);

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove `item` if selected, append it otherwise.
    ///
    /// Returns `true` when the item is selected afterwards.
    pub fn toggle(&mut self, item: impl Into<String>) -> bool {
        let item = item.into();
        match self.0.iter().position(|existing| *existing == item) {
            Some(index) => {
                self.0.remove(index);
                false
            }
            None => {
                self.0.push(item);
                true
            }
        }
    }

    /// Append `item` unless already present.
    pub fn insert(&mut self, item: impl Into<String>) -> bool {
        let item = item.into();
        if self.contains(&item) {
            return false;
        }
        self.0.push(item);
        true
    }

    pub fn contains(&self, item: &str) -> bool {
        self.0.iter().any(|existing| existing == item)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for SelectionSet {
    fn from(items: Vec<String>) -> Self {
        let mut set = SelectionSet::new();
        for item in items {
            set.insert(item);
        }
        set
    }
}

impl From<SelectionSet> for Vec<String> {
    fn from(set: SelectionSet) -> Self {
        set.0
    }
}

impl<S: Into<String>> FromIterator<S> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = SelectionSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

/// Split a free-text, comma-separated interests field.
///
/// Entries are trimmed; blank entries are dropped.
pub fn split_interests(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// The reader's background questionnaire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Background {
    #[serde(
        default,
        alias = "softwareExperience",
        alias = "software_experience",
        alias = "experienceLevel"
    )]
    pub experience_level: ExperienceLevel,

    #[serde(
        default,
        alias = "hardwareKnowledge",
        skip_serializing_if = "Option::is_none"
    )]
    pub hardware_knowledge: Option<HardwareLevel>,

    #[serde(
        default,
        alias = "programmingLanguages",
        alias = "preferred_languages"
    )]
    pub programming_languages: SelectionSet,

    #[serde(default)]
    pub interests: SelectionSet,
}

impl Background {
    /// Defaults used by the personalization panel before anything is loaded.
    pub fn panel_default() -> Self {
        Self {
            experience_level: ExperienceLevel::Beginner,
            hardware_knowledge: Some(HardwareLevel::Beginner),
            programming_languages: SelectionSet::new(),
            interests: SelectionSet::new(),
        }
    }

    pub fn with_experience(mut self, level: ExperienceLevel) -> Self {
        self.experience_level = level;
        self
    }

    pub fn with_hardware(mut self, level: HardwareLevel) -> Self {
        self.hardware_knowledge = Some(level);
        self
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.programming_languages = languages.into_iter().collect();
        self
    }

    pub fn with_interests<I, S>(mut self, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interests = interests.into_iter().collect();
        self
    }
}
