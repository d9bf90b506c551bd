//! Dummy LLM provider: echoes input back prefixed with `[echo]`, and embeds
//! text as hashed character trigrams.
//!
//! Used to run the whole pipeline without a model server. The trigram
//! embedding is deterministic, so similar spellings land close together and
//! the proper-noun lookup behaves sensibly offline.

use sha2::{Digest, Sha256};

use crate::llm::{LlmResponse, ProviderError};

/// Dimension of the hashed trigram embedding.
pub const EMBEDDING_DIM: usize = 256;

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, content: &str, _system: Option<&str>) -> Result<LlmResponse, ProviderError> {
        Ok(LlmResponse { text: format!("[echo] {content}"), usage: None })
    }

    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(inputs.iter().map(|s| hashed_embedding(s)).collect())
    }
}

/// Bag of lowercase character trigrams, hashed into [`EMBEDDING_DIM`] buckets
/// and L2-normalised. Text shorter than three characters hashes as a whole.
pub fn hashed_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0f32; EMBEDDING_DIM];
    let padded: Vec<char> = format!("  {}  ", text.trim().to_lowercase()).chars().collect();

    for window in padded.windows(3) {
        let gram: String = window.iter().collect();
        if gram.trim().is_empty() {
            continue;
        }
        let digest = Sha256::digest(gram.as_bytes());
        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize % EMBEDDING_DIM;
        v[bucket] += 1.0;
    }

    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
