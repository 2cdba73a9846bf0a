use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::embedding::{DEFAULT_EMBED_URL, DEFAULT_MODEL};

#[derive(Parser, Debug)]
#[command(
    name = "rankeval",
    version,
    about = "Retrieval-quality evaluation for the document search sandbox"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Insert one document and its embedding into the store
    Add(AddArgs),
    /// Embed documents that are missing or stale for a model
    Embed(EmbedArgs),
    /// Run retrieval trials and persist rankings as JSONL
    Run(RunArgs),
    /// Score persisted rankings against relevance judgments
    Metrics(MetricsArgs),
    /// Show store contents
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(long, default_value = ".cache/rankeval")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub body: String,

    #[arg(long, default_value = "cli")]
    pub docset: String,

    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, default_value = DEFAULT_EMBED_URL)]
    pub embed_url: String,

    /// What to embed: the indexed content (title + body) or the body alone
    #[arg(long, value_enum, default_value_t = EmbedField::Content)]
    pub embed_field: EmbedField,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmbedField {
    Content,
    Body,
}

#[derive(Args, Debug, Clone)]
pub struct EmbedArgs {
    #[arg(long, default_value = ".cache/rankeval")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, default_value = DEFAULT_EMBED_URL)]
    pub embed_url: String,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Maximum documents to embed this pass (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,

    /// Re-embed even when an up-to-date embedding exists
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = ".cache/rankeval")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Query + relevance JSON path
    #[arg(long, default_value = "evaluations/data.json")]
    pub data: PathBuf,

    #[arg(long, default_value = DEFAULT_EMBED_URL)]
    pub embed_url: String,

    #[arg(long, default_value = "seed2")]
    pub docset: String,

    /// Comma separated embedding model list (default: all predefined)
    #[arg(long)]
    pub models: Option<String>,

    /// Comma separated modes to run (subset of text,vector,hybrid)
    #[arg(long, default_value = "text,vector,hybrid")]
    pub modes: String,

    /// Rows to store per ranking
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Candidate rows from text search for text/hybrid
    #[arg(long, default_value_t = 50)]
    pub text_limit: usize,

    /// Candidate rows from vector search for vector/hybrid
    #[arg(long, default_value_t = 50)]
    pub vector_limit: usize,

    #[arg(long, default_value_t = 60)]
    pub rrf_k: u32,

    /// Weight pairs for hybrid mode, e.g. 1:1 2:1 or comma separated
    #[arg(long = "rrf-weights", num_args = 0.., default_value = "1:1")]
    pub rrf_weights: Vec<String>,

    /// k values recorded for downstream metrics
    #[arg(long, num_args = 0.., default_values_t = [3, 5, 10])]
    pub k: Vec<usize>,

    /// Comma separated query slugs to evaluate (others skipped)
    #[arg(long, default_value = "")]
    pub only: String,

    /// Output directory (default: evaluations/out/<timestamp>)
    #[arg(long)]
    pub outdir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MetricsArgs {
    /// Query + relevance JSON path
    #[arg(long, default_value = "evaluations/data.json")]
    pub data: PathBuf,

    /// Rankings JSONL path from a run
    #[arg(long)]
    pub rankings: PathBuf,

    /// k values for recall/nDCG
    #[arg(long, num_args = 0.., default_values_t = [3, 5, 10])]
    pub k: Vec<usize>,

    /// Also emit per-query metrics
    #[arg(long, default_value_t = false)]
    pub per_query: bool,

    /// Directory for metrics.json/.md (default: next to rankings)
    #[arg(long)]
    pub outdir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/rankeval")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
