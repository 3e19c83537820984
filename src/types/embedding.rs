//! Stored embedding rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of entity an embedding describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    CreatorBio,
    Campaign,
}

/// One embedding per (entity type, entity id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub vector: Vec<f32>,
    /// Source text the vector was computed from
    pub text: String,
    /// Provider model name, or the local fallback name
    pub model: String,
    pub dims: usize,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}
