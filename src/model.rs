//! Data model shared by the orchestrator and the aggregation pass:
//! query/relevance input, persisted ranking records, and condition keys.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// One evaluation query with its per-docset relevance judgments.
///
/// `relevant_doc_ids` keeps the order of the input document: nDCG treats the
/// list order as the ideal ranking.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryInfo {
    pub slug: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub relevant_doc_ids: HashMap<String, Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct QueryFile {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    queries: Vec<QueryInfo>,
}

/// The query/relevance document, loaded once per run and read-only after.
#[derive(Debug, Clone)]
pub struct QuerySet {
    pub version: String,
    pub queries: Vec<QueryInfo>,
    index_by_slug: HashMap<String, usize>,
}

impl QuerySet {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)
            .with_context(|| format!("failed to read query data: {}", path.display()))?;
        let file: QueryFile = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse query data: {}", path.display()))?;

        if file.queries.is_empty() {
            bail!("queries list is empty in {}", path.display());
        }

        let mut index_by_slug = HashMap::with_capacity(file.queries.len());
        for (index, query) in file.queries.iter().enumerate() {
            if index_by_slug.insert(query.slug.clone(), index).is_some() {
                bail!(
                    "duplicate query slug '{}' in {}",
                    query.slug,
                    path.display()
                );
            }
        }

        Ok(Self {
            version: file.version.unwrap_or_else(|| "unknown".to_string()),
            queries: file.queries,
            index_by_slug,
        })
    }

    pub fn get(&self, slug: &str) -> Option<&QueryInfo> {
        self.index_by_slug
            .get(slug)
            .map(|index| &self.queries[*index])
    }

    /// Relevant ids for a (slug, docset) pair. `None` means the slug itself
    /// is unknown; a known slug with no judgments for the docset yields an
    /// empty slice so every metric scores 0.0 for it.
    pub fn relevant_for(&self, slug: &str, docset: &str) -> Option<&[i64]> {
        self.get(slug).map(|query| {
            query
                .relevant_doc_ids
                .get(docset)
                .map(Vec::as_slice)
                .unwrap_or(&[])
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Text,
    Vector,
    Hybrid,
}

impl RetrievalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
        }
    }

    /// Parse a comma-separated mode list such as `text,hybrid`.
    pub fn parse_csv(value: &str) -> Result<Vec<Self>> {
        let mut modes = Vec::new();
        for token in value.split(',') {
            let token = token.trim().to_ascii_lowercase();
            if token.is_empty() {
                continue;
            }
            let mode = match token.as_str() {
                "text" => Self::Text,
                "vector" => Self::Vector,
                "hybrid" => Self::Hybrid,
                other => bail!("unsupported mode '{other}'; choose from text, vector, hybrid"),
            };
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        if modes.is_empty() {
            bail!("at least one mode must be specified");
        }
        Ok(modes)
    }
}

/// RRF settings attached to hybrid records on the wire:
/// `{"k": 60, "weights": {"text": 1.0, "vector": 1.0}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RrfSettings {
    pub k: u32,
    pub weights: RrfWeightPair,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RrfWeightPair {
    pub text: f64,
    pub vector: f64,
}

/// Trial parameters echoed into every record for later inspection. Fixed
/// field set; absent values stay off the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrf_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextResult {
    pub rank: usize,
    pub document_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorResult {
    pub rank: usize,
    pub document_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub distance: f64,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridResult {
    pub rank: usize,
    pub document_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub rrf_score: f64,
    #[serde(default)]
    pub text_rank: Option<usize>,
    #[serde(default)]
    pub text_score: Option<f64>,
    #[serde(default)]
    pub vector_rank: Option<usize>,
    #[serde(default)]
    pub vector_distance: Option<f64>,
    #[serde(default)]
    pub vector_similarity: Option<f64>,
}

/// One ranked row inside a record. The variants carry the mode-specific
/// field sets; the mandatory fields (`rrf_score` vs `distance` vs `score`)
/// keep untagged decoding unambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RankedResult {
    Hybrid(HybridResult),
    Vector(VectorResult),
    Text(TextResult),
}

impl RankedResult {
    pub fn document_id(&self) -> i64 {
        match self {
            Self::Hybrid(result) => result.document_id,
            Self::Vector(result) => result.document_id,
            Self::Text(result) => result.document_id,
        }
    }

    pub fn rank(&self) -> usize {
        match self {
            Self::Hybrid(result) => result.rank,
            Self::Vector(result) => result.rank,
            Self::Text(result) => result.rank,
        }
    }
}

/// One persisted evaluation trial, immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingRecord {
    pub timestamp: String,
    pub query_slug: String,
    #[serde(default)]
    pub query: Option<String>,
    pub docset: String,
    pub mode: RetrievalMode,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub rrf: Option<RrfSettings>,
    #[serde(default)]
    pub params: RecordParams,
    pub results: Vec<RankedResult>,
}

impl RankingRecord {
    /// Grouping key and report row label. Two records aggregate together
    /// iff their keys are equal; float weights render via `Display`, which
    /// is injective on f64, so string equality matches exact value equality.
    pub fn condition_key(&self) -> String {
        let mut parts = vec![self.docset.clone(), self.mode.as_str().to_string()];
        if let Some(model) = &self.model {
            parts.push(model.clone());
        }
        if let Some(rrf) = &self.rrf {
            parts.push(format!(
                "text={}:vector={}",
                rrf.weights.text, rrf.weights.vector
            ));
        }
        parts.join("|")
    }

    pub fn result_ids(&self) -> Vec<i64> {
        self.results.iter().map(RankedResult::document_id).collect()
    }
}

/// Load a rankings JSONL file. A single malformed line fails the entire
/// load with the offending line number: partial evaluation results are
/// worse than none.
pub fn load_rankings(path: &Path) -> Result<Vec<RankingRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read rankings: {}", path.display()))?;

    let mut rankings = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: RankingRecord = serde_json::from_str(line).with_context(|| {
            format!("malformed ranking record at {}:{}", path.display(), index + 1)
        })?;
        rankings.push(record);
    }

    if rankings.is_empty() {
        bail!("rankings file {} contains no records", path.display());
    }
    Ok(rankings)
}
