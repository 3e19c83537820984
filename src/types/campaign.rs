//! Campaign records

use serde::{Deserialize, Serialize};

/// Campaign as read from the record store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Unique campaign identifier
    pub id: String,

    /// Campaign title
    #[serde(default)]
    pub title: String,

    /// Brief shown to creators
    #[serde(default)]
    pub description: String,

    /// Target content category
    #[serde(default)]
    pub category: String,

    /// Content format (post, reel, story, video, ...)
    #[serde(default = "default_format")]
    pub format: String,

    /// Total budget in account currency
    #[serde(default)]
    pub budget: f64,

    /// Locations the brand wants to reach (empty = anywhere)
    #[serde(default)]
    pub target_locations: Vec<String>,

    /// Minimum follower count the brand targets
    #[serde(default)]
    pub min_followers: Option<u64>,

    /// Maximum follower count the brand targets
    #[serde(default)]
    pub max_followers: Option<u64>,
}

fn default_format() -> String {
    "post".to_string()
}

impl Campaign {
    pub fn new(id: impl Into<String>, category: impl Into<String>, budget: f64) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            description: String::new(),
            category: category.into(),
            format: default_format(),
            budget,
            target_locations: Vec::new(),
            min_followers: None,
            max_followers: None,
        }
    }

    /// Set title and brief
    pub fn with_text(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.title = title.into();
        self.description = description.into();
        self
    }

    /// Set content format
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Text used for the campaign's embedding
    pub fn embedding_text(&self) -> String {
        [self.title.as_str(), self.description.as_str(), self.category.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}
