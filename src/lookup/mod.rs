//! Proper-noun lookup: nearest-neighbour search over embedded entity names.
//!
//! Names are pulled from the database with single-column source queries
//! (artists and album titles by default), cleaned of standalone numbers, and
//! deduplicated. Their embeddings are cached in a SQLite index file so a
//! restart only embeds names it has not seen before.

mod store;

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use crate::db::{Database, SqlValue};
use crate::error::AppError;
use crate::llm::LlmProvider;

pub use store::IndexStore;

/// Names embedded per provider request.
const EMBED_BATCH: usize = 64;

const NUMERIC_TOKEN: &str = r"\b\d+\b";

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct NounMatch {
    pub name: String,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f32,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    vector: Vec<f32>,
}

#[derive(Debug)]
pub struct ProperNounIndex {
    embedder: LlmProvider,
    entries: Vec<Entry>,
}

impl ProperNounIndex {
    /// Collect names from `sources`, embed the ones missing from the index
    /// file at `index_path`, and load the full set into memory.
    ///
    /// `model_key` identifies the embedding model; cached vectors from a
    /// different model are ignored.
    pub async fn build(
        db: &Database,
        sources: &[String],
        embedder: LlmProvider,
        model_key: &str,
        index_path: &Path,
    ) -> Result<Self, AppError> {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        for sql in sources {
            for name in query_as_list(db, sql)? {
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }

        let store = IndexStore::open(index_path)?;
        let mut cached = store.load(model_key)?;
        let missing: Vec<String> = names.iter().filter(|n| !cached.contains_key(*n)).cloned().collect();
        info!(
            names = names.len(),
            cached = names.len() - missing.len(),
            to_embed = missing.len(),
            "building proper-noun index"
        );

        for batch in missing.chunks(EMBED_BATCH) {
            let vectors = embedder.embed(batch).await?;
            let rows: Vec<(String, Vec<f32>)> = batch.iter().cloned().zip(vectors).collect();
            store.insert(model_key, &rows)?;
            cached.extend(rows);
        }

        let entries = names
            .into_iter()
            .filter_map(|name| cached.remove(&name).map(|vector| Entry { name, vector }))
            .collect();
        Ok(Self { embedder, entries })
    }

    /// Index `names` in memory only, without a database or index file.
    pub async fn from_names(names: Vec<String>, embedder: LlmProvider) -> Result<Self, AppError> {
        let vectors = embedder.embed(&names).await?;
        let entries = names
            .into_iter()
            .zip(vectors)
            .map(|(name, vector)| Entry { name, vector })
            .collect();
        Ok(Self { embedder, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` names closest to `approximate`, best first.
    pub async fn search(&self, approximate: &str, k: usize) -> Result<Vec<NounMatch>, AppError> {
        if approximate.trim().is_empty() || k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query = self
            .embedder
            .embed(&[approximate.trim().to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Lookup("embedder returned no vector".into()))?;

        let mut matches = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if entry.vector.len() != query.len() {
                return Err(AppError::Lookup(format!(
                    "embedding dimension mismatch: index has {}, query has {}",
                    entry.vector.len(),
                    query.len()
                )));
            }
            matches.push(NounMatch { name: entry.name.clone(), score: cosine(&query, &entry.vector) });
        }

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        matches.truncate(k);
        debug!(query = %approximate, hits = matches.len(), "proper-noun search");
        Ok(matches)
    }
}

/// Run a query and flatten its cells into cleaned, deduplicated strings.
///
/// Null and empty cells are skipped, standalone numbers are removed
/// (`"Chronicle, Vol. 2"` → `"Chronicle, Vol."`), and values that are empty
/// after cleaning are dropped. First-seen order is kept.
pub fn query_as_list(db: &Database, sql: &str) -> Result<Vec<String>, AppError> {
    let numeric = Regex::new(NUMERIC_TOKEN).map_err(|e| AppError::Lookup(format!("regex: {e}")))?;
    let rows = db.rows(sql)?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for cell in rows.into_iter().flatten() {
        let text = match cell {
            SqlValue::Text(s) => s,
            SqlValue::Integer(i) => i.to_string(),
            SqlValue::Real(f) => f.to_string(),
            SqlValue::Null | SqlValue::Blob(_) => continue,
        };
        if text.is_empty() {
            continue;
        }
        let cleaned = numeric.replace_all(&text, "").trim().to_string();
        if !cleaned.is_empty() && seen.insert(cleaned.clone()) {
            out.push(cleaned);
        }
    }
    Ok(out)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}
