//! Text embeddings and semantic similarity.
//!
//! Embeddings come from an external provider when one is configured. When the
//! provider is missing or fails, a deterministic hashed bag-of-words vector is
//! produced instead, so an embedding is always available. Callers must not
//! assume provider-quality semantics from stored vectors.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::batch::{run_page, BatchSummary};
use crate::config::EmbeddingConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::Store;
use crate::types::{Embedding, EntityType};

/// Model name recorded for locally computed vectors
pub const LOCAL_MODEL: &str = "local-hash-v1";

/// External text embedding service
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;
}

/// Client for an OpenAI-compatible `/embeddings` endpoint
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    /// Build a provider from configuration; `None` when no provider URL is set
    pub fn from_config(config: &EmbeddingConfig) -> Result<Option<Self>> {
        let Some(base) = &config.provider_url else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build embedding HTTP client")?;

        Ok(Some(Self {
            client,
            url: format!("{}/embeddings", base.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
            dimensions: config.dimensions,
        }))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut request = self.client.post(&self.url).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimensions,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: EmbeddingResponse = request
            .send()
            .await
            .context("Embedding request failed")?
            .error_for_status()
            .context("Embedding provider returned an error status")?
            .json()
            .await
            .context("Failed to decode embedding response")?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("Embedding response contained no vectors")
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Cosine similarity in [-1, 1].
///
/// Mismatched lengths, empty vectors and zero vectors yield 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn bucket(token: &str, dims: usize) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(bytes) % dims as u64) as usize
}

/// Deterministic hashed embedding: term frequency times a length weight, L2-normalized
pub fn local_embedding(text: &str, dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dims];
    if dims == 0 {
        return vector;
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }

    for (token, tf) in &counts {
        let weight = *tf as f64 * (1.0 + token.chars().count() as f64 / 3.0).ln();
        vector[bucket(token, dims)] += weight as f32;
    }

    let norm = vector.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v = (*v as f64 / norm) as f32;
        }
    }
    vector
}

/// Creator ranked by similarity to a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarCreator {
    pub creator_id: String,
    pub similarity: f64,
}

/// Embedding and similarity service
pub struct EmbeddingEngine {
    store: Arc<dyn Store>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    dims: usize,
}

impl EmbeddingEngine {
    pub fn new(store: Arc<dyn Store>, provider: Option<Arc<dyn EmbeddingProvider>>, dims: usize) -> Self {
        Self { store, provider, dims }
    }

    /// Embed text, falling back to the local embedding on any provider failure.
    ///
    /// Returns the vector and the model name that produced it.
    pub async fn embed(&self, text: &str) -> (Vec<f32>, String) {
        if text.trim().is_empty() {
            return (vec![0.0; self.dims], LOCAL_MODEL.to_string());
        }

        if let Some(provider) = &self.provider {
            match provider.embed(text).await {
                Ok(vector) if vector.len() == self.dims => {
                    return (vector, provider.model_name().to_string());
                }
                Ok(vector) => {
                    warn!(
                        expected = self.dims,
                        actual = vector.len(),
                        "Provider embedding has wrong dimensionality, using local embedding"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Embedding provider unavailable, using local embedding");
                }
            }
        }

        (local_embedding(text, self.dims), LOCAL_MODEL.to_string())
    }

    /// Compute and store an embedding; unchanged text keeps the existing row
    pub async fn upsert_embedding(&self, entity_type: EntityType, entity_id: &str, text: &str) -> EngineResult<Embedding> {
        if let Some(existing) = self.store.get_embedding(entity_type, entity_id).await? {
            if existing.text == text && existing.dims == self.dims {
                debug!(entity_id = %entity_id, "Embedding text unchanged, skipping");
                return Ok(existing);
            }
        }

        let (vector, model) = self.embed(text).await;
        let embedding = Embedding {
            entity_type,
            entity_id: entity_id.to_string(),
            vector,
            text: text.to_string(),
            model,
            dims: self.dims,
            updated_at: Utc::now(),
        };
        self.store.upsert_embedding(embedding.clone()).await?;
        Ok(embedding)
    }

    async fn creator_embedding(&self, creator_id: &str) -> EngineResult<Embedding> {
        if let Some(existing) = self.store.get_embedding(EntityType::CreatorBio, creator_id).await? {
            return Ok(existing);
        }
        let creator = self
            .store
            .get_creator(creator_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Creator", creator_id))?;
        self.upsert_embedding(EntityType::CreatorBio, creator_id, &creator.embedding_text())
            .await
    }

    async fn campaign_embedding(&self, campaign_id: &str) -> EngineResult<Embedding> {
        if let Some(existing) = self.store.get_embedding(EntityType::Campaign, campaign_id).await? {
            return Ok(existing);
        }
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Campaign", campaign_id))?;
        self.upsert_embedding(EntityType::Campaign, campaign_id, &campaign.embedding_text())
            .await
    }

    /// Similarity between a creator's bio and a campaign's brief
    pub async fn similarity(&self, creator_id: &str, campaign_id: &str) -> EngineResult<f64> {
        let creator = self.creator_embedding(creator_id).await?;
        let campaign = self.campaign_embedding(campaign_id).await?;
        Ok(cosine_similarity(&creator.vector, &campaign.vector))
    }

    /// Creators most similar to a campaign, by linear scan over stored bios
    pub async fn find_similar(&self, campaign_id: &str, limit: usize) -> EngineResult<Vec<SimilarCreator>> {
        let campaign = self.campaign_embedding(campaign_id).await?;
        let creators = self.store.list_embeddings(EntityType::CreatorBio).await?;

        let mut ranked: Vec<SimilarCreator> = creators
            .iter()
            .map(|e| SimilarCreator {
                creator_id: e.entity_id.clone(),
                similarity: cosine_similarity(&campaign.vector, &e.vector),
            })
            .collect();
        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Re-embed every creator bio and campaign brief, page by page
    pub async fn embed_all(&self, page_size: usize) -> EngineResult<BatchSummary> {
        let page_size = page_size.max(1);
        let mut summary = BatchSummary::default();

        let mut offset = 0;
        loop {
            let page = self.store.list_creators(offset, page_size).await?;
            let count = page.len();
            let texts: HashMap<String, String> =
                page.iter().map(|c| (c.id.clone(), c.embedding_text())).collect();
            let texts = &texts;
            run_page(
                "embed_creators",
                page.into_iter().map(|c| c.id),
                |id| async move {
                    let text = texts.get(&id).map(String::as_str).unwrap_or_default();
                    self.upsert_embedding(EntityType::CreatorBio, &id, text).await
                },
                &mut summary,
            )
            .await;
            offset += count;
            if count < page_size {
                break;
            }
        }

        let mut offset = 0;
        loop {
            let page = self.store.list_campaigns(offset, page_size).await?;
            let count = page.len();
            let texts: HashMap<String, String> =
                page.iter().map(|c| (c.id.clone(), c.embedding_text())).collect();
            let texts = &texts;
            run_page(
                "embed_campaigns",
                page.into_iter().map(|c| c.id),
                |id| async move {
                    let text = texts.get(&id).map(String::as_str).unwrap_or_default();
                    self.upsert_embedding(EntityType::Campaign, &id, text).await
                },
                &mut summary,
            )
            .await;
            offset += count;
            if count < page_size {
                break;
            }
        }

        info!(processed = summary.processed, errors = summary.errors, "Embedding refresh complete");
        Ok(summary)
    }
}
