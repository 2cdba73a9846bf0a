//! Run orchestrator: drives each selected query through the configured
//! retrieval modes and persists one ranking record per trial.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::cli::RunArgs;
use crate::embedding::{
    DEFAULT_MODELS, EmbeddingProvider, HttpEmbeddingClient, QueryEmbeddingCache,
};
use crate::fusion::{FusedHit, RrfConfig, TextCandidate, VectorCandidate, fuse_rrf};
use crate::model::{
    HybridResult, QueryInfo, QuerySet, RankedResult, RankingRecord, RecordParams, RetrievalMode,
    RrfSettings, RrfWeightPair, TextResult, VectorResult,
};
use crate::store::DocumentStore;
use crate::util::{
    ensure_directory, now_utc_string, sha256_file, utc_compact_string, write_json_pretty,
    write_jsonl,
};

/// Everything the orchestrator needs to know, resolved up front from the
/// CLI. No process-wide state: the plan is built once and passed down.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub docset: String,
    pub modes: Vec<RetrievalMode>,
    pub models: Vec<String>,
    pub weights: Vec<RrfWeightPair>,
    pub rrf_k: u32,
    pub limit: usize,
    pub text_limit: usize,
    pub vector_limit: usize,
}

impl RunPlan {
    pub fn from_args(args: &RunArgs) -> Result<Self> {
        Ok(Self {
            docset: args.docset.clone(),
            modes: RetrievalMode::parse_csv(&args.modes)?,
            models: parse_models(args.models.as_deref())?,
            weights: parse_rrf_weights(&args.rrf_weights)?,
            rrf_k: args.rrf_k,
            limit: args.limit,
            text_limit: args.text_limit,
            vector_limit: args.vector_limit,
        })
    }

    fn wants(&self, mode: RetrievalMode) -> bool {
        self.modes.contains(&mode)
    }

    fn needs_text(&self) -> bool {
        self.wants(RetrievalMode::Text) || self.wants(RetrievalMode::Hybrid)
    }

    fn needs_embeddings(&self) -> bool {
        self.wants(RetrievalMode::Vector) || self.wants(RetrievalMode::Hybrid)
    }
}

#[derive(Debug, Serialize)]
struct RunOutputPaths {
    dir: String,
    rankings: String,
}

#[derive(Debug, Serialize)]
struct RunConfigManifest {
    generated_at: String,
    data_version: String,
    data_sha256: String,
    docset: String,
    modes: Vec<RetrievalMode>,
    models: Vec<String>,
    rrf_weights: Vec<RrfWeightPair>,
    rrf_k: u32,
    limit: usize,
    text_limit: usize,
    vector_limit: usize,
    k_values: Vec<usize>,
    queries: Vec<String>,
    output: RunOutputPaths,
}

pub fn run(args: RunArgs) -> Result<()> {
    let plan = RunPlan::from_args(&args)?;
    let slug_filter = parse_slug_filter(&args.only);

    let query_set = QuerySet::load(&args.data)?;
    let selected = select_queries(&query_set, &slug_filter)?;
    if selected.is_empty() {
        bail!("no queries selected for evaluation");
    }

    let outdir = args.outdir.clone().unwrap_or_else(|| {
        PathBuf::from("evaluations/out").join(utc_compact_string(Utc::now()))
    });
    ensure_directory(&outdir)?;
    let rankings_path = outdir.join("rankings.jsonl");
    let config_path = outdir.join("run_config.json");

    let db_path = super::resolve_db_path(&args.cache_root, args.db_path.as_deref());
    let store = DocumentStore::open(&db_path)?;
    let model_dims = if plan.needs_embeddings() {
        store.model_dims_map(&plan.models)?
    } else {
        HashMap::new()
    };
    let embedder = HttpEmbeddingClient::new(&args.embed_url)?;

    let records = execute_plan(&plan, &selected, &store, &embedder, &model_dims)?;
    write_jsonl(&rankings_path, &records)?;

    let manifest = RunConfigManifest {
        generated_at: now_utc_string(),
        data_version: query_set.version.clone(),
        data_sha256: sha256_file(&args.data)?,
        docset: plan.docset.clone(),
        modes: plan.modes.clone(),
        models: plan.models.clone(),
        rrf_weights: plan.weights.clone(),
        rrf_k: plan.rrf_k,
        limit: plan.limit,
        text_limit: plan.text_limit,
        vector_limit: plan.vector_limit,
        k_values: args.k.clone(),
        queries: selected.iter().map(|query| query.slug.clone()).collect(),
        output: RunOutputPaths {
            dir: outdir.display().to_string(),
            rankings: rankings_path.display().to_string(),
        },
    };
    write_json_pretty(&config_path, &manifest)?;

    info!(
        path = %rankings_path.display(),
        records = records.len(),
        "saved rankings"
    );
    info!(path = %config_path.display(), "saved run config");
    Ok(())
}

/// One query at a time through every configured mode. Text candidates are
/// fetched once per query and shared across every model and weight pair;
/// query embeddings are memoized per (model, text) for the whole run.
fn execute_plan(
    plan: &RunPlan,
    queries: &[&QueryInfo],
    store: &DocumentStore,
    embedder: &dyn EmbeddingProvider,
    model_dims: &HashMap<String, usize>,
) -> Result<Vec<RankingRecord>> {
    let mut embedding_cache = QueryEmbeddingCache::default();
    let mut records = Vec::<RankingRecord>::new();

    for query in queries {
        info!(slug = %query.slug, query = %query.query, "evaluating query");

        let text_hits: Vec<TextCandidate> = if plan.needs_text() {
            let hits = store.text_search(&query.query, &plan.docset, plan.text_limit)?;
            info!(slug = %query.slug, hits = hits.len(), "text search");
            if plan.wants(RetrievalMode::Text) {
                records.push(text_record(plan, query, &hits));
            }
            hits
        } else {
            Vec::new()
        };

        if !plan.needs_embeddings() {
            continue;
        }

        for model in &plan.models {
            let dims = *model_dims
                .get(model)
                .with_context(|| format!("no dims resolved for model '{model}'"))?;
            let query_vector =
                embedding_cache.embed_query(embedder, model, &query.query, dims)?;
            let vector_hits =
                store.vector_search(&query_vector, model, &plan.docset, plan.vector_limit)?;
            info!(slug = %query.slug, model = %model, hits = vector_hits.len(), "vector search");

            if plan.wants(RetrievalMode::Vector) {
                records.push(vector_record(plan, query, model, dims, &vector_hits));
            }

            if plan.wants(RetrievalMode::Hybrid) {
                for pair in &plan.weights {
                    let config = RrfConfig {
                        rrf_k: plan.rrf_k,
                        weight_text: pair.text,
                        weight_vector: pair.vector,
                    };
                    let fused = fuse_rrf(&text_hits, &vector_hits, &config, plan.limit);
                    records.push(hybrid_record(plan, query, model, dims, *pair, &fused));
                }
            }
        }
    }

    Ok(records)
}

fn text_record(plan: &RunPlan, query: &QueryInfo, hits: &[TextCandidate]) -> RankingRecord {
    RankingRecord {
        timestamp: now_utc_string(),
        query_slug: query.slug.clone(),
        query: Some(query.query.clone()),
        docset: plan.docset.clone(),
        mode: RetrievalMode::Text,
        model: None,
        rrf: None,
        params: RecordParams {
            limit: Some(plan.limit),
            text_limit: Some(plan.text_limit),
            vector_limit: Some(plan.vector_limit),
            rrf_k: Some(plan.rrf_k),
            dims: None,
        },
        results: hits
            .iter()
            .take(plan.limit)
            .enumerate()
            .map(|(index, hit)| {
                RankedResult::Text(TextResult {
                    rank: index + 1,
                    document_id: hit.document_id,
                    title: Some(hit.title.clone()),
                    score: hit.score,
                })
            })
            .collect(),
    }
}

fn vector_record(
    plan: &RunPlan,
    query: &QueryInfo,
    model: &str,
    dims: usize,
    hits: &[VectorCandidate],
) -> RankingRecord {
    RankingRecord {
        timestamp: now_utc_string(),
        query_slug: query.slug.clone(),
        query: Some(query.query.clone()),
        docset: plan.docset.clone(),
        mode: RetrievalMode::Vector,
        model: Some(model.to_string()),
        rrf: None,
        params: RecordParams {
            limit: Some(plan.limit),
            text_limit: Some(plan.text_limit),
            vector_limit: Some(plan.vector_limit),
            rrf_k: Some(plan.rrf_k),
            dims: Some(dims),
        },
        results: hits
            .iter()
            .take(plan.limit)
            .enumerate()
            .map(|(index, hit)| {
                RankedResult::Vector(VectorResult {
                    rank: index + 1,
                    document_id: hit.document_id,
                    title: Some(hit.title.clone()),
                    distance: hit.distance,
                    similarity: hit.similarity,
                })
            })
            .collect(),
    }
}

fn hybrid_record(
    plan: &RunPlan,
    query: &QueryInfo,
    model: &str,
    dims: usize,
    weights: RrfWeightPair,
    fused: &[FusedHit],
) -> RankingRecord {
    RankingRecord {
        timestamp: now_utc_string(),
        query_slug: query.slug.clone(),
        query: Some(query.query.clone()),
        docset: plan.docset.clone(),
        mode: RetrievalMode::Hybrid,
        model: Some(model.to_string()),
        rrf: Some(RrfSettings {
            k: plan.rrf_k,
            weights,
        }),
        params: RecordParams {
            limit: Some(plan.limit),
            text_limit: Some(plan.text_limit),
            vector_limit: Some(plan.vector_limit),
            rrf_k: None,
            dims: Some(dims),
        },
        results: fused
            .iter()
            .enumerate()
            .map(|(index, hit)| {
                RankedResult::Hybrid(HybridResult {
                    rank: index + 1,
                    document_id: hit.document_id,
                    title: hit.title.clone(),
                    rrf_score: hit.rrf_score,
                    text_rank: hit.text_rank,
                    text_score: hit.text_score,
                    vector_rank: hit.vector_rank,
                    vector_distance: hit.vector_distance,
                    vector_similarity: hit.vector_similarity,
                })
            })
            .collect(),
    }
}

fn parse_models(models_arg: Option<&str>) -> Result<Vec<String>> {
    let Some(models_arg) = models_arg else {
        return Ok(DEFAULT_MODELS.iter().map(|model| model.to_string()).collect());
    };

    let models = models_arg
        .split(',')
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .map(str::to_string)
        .collect::<Vec<String>>();
    if models.is_empty() {
        bail!("at least one embedding model must be specified");
    }
    Ok(models)
}

fn parse_rrf_weights(weight_args: &[String]) -> Result<Vec<RrfWeightPair>> {
    let mut weights = Vec::new();
    for arg in weight_args {
        for token in arg.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let Some((left, right)) = token.split_once(':') else {
                bail!("invalid weight format '{token}'; use pairs like 1:1 or 2.0:1.0");
            };
            let text = left
                .trim()
                .parse::<f64>()
                .with_context(|| format!("weights must be numeric values: '{token}'"))?;
            let vector = right
                .trim()
                .parse::<f64>()
                .with_context(|| format!("weights must be numeric values: '{token}'"))?;
            weights.push(RrfWeightPair { text, vector });
        }
    }

    if weights.is_empty() {
        weights.push(RrfWeightPair {
            text: 1.0,
            vector: 1.0,
        });
    }
    Ok(weights)
}

fn parse_slug_filter(only: &str) -> Vec<String> {
    only.split(',')
        .map(str::trim)
        .filter(|slug| !slug.is_empty())
        .map(str::to_string)
        .collect()
}

fn select_queries<'a>(
    query_set: &'a QuerySet,
    slug_filter: &[String],
) -> Result<Vec<&'a QueryInfo>> {
    if slug_filter.is_empty() {
        return Ok(query_set.queries.iter().collect());
    }

    let mut missing = slug_filter
        .iter()
        .filter(|slug| query_set.get(slug).is_none())
        .cloned()
        .collect::<Vec<String>>();
    if !missing.is_empty() {
        missing.sort();
        bail!("unknown query slug(s): {}", missing.join(", "));
    }

    Ok(query_set
        .queries
        .iter()
        .filter(|query| slug_filter.iter().any(|slug| slug == &query.slug))
        .collect())
}
