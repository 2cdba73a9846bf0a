//! Aggregation pass: score a rankings JSONL file against the relevance
//! judgments and write `metrics.json` + `metrics.md`.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::aggregate::{render_markdown, summarize};
use crate::cli::MetricsArgs;
use crate::model::{QuerySet, load_rankings};
use crate::util::{ensure_directory, write_json_pretty};

#[derive(Debug, Serialize)]
struct MetricsArtifact {
    summary: BTreeMap<String, BTreeMap<String, f64>>,
    per_query: BTreeMap<String, BTreeMap<String, f64>>,
}

pub fn run(args: MetricsArgs) -> Result<()> {
    let queries = QuerySet::load(&args.data)?;
    let rankings = load_rankings(&args.rankings)?;

    let report = summarize(&queries, &rankings, &args.k);
    let table = render_markdown(&report.summary, &args.k);

    let outdir = match &args.outdir {
        Some(outdir) => outdir.clone(),
        None => match args.rankings.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
    };
    ensure_directory(&outdir)?;

    let json_path = outdir.join("metrics.json");
    let artifact = MetricsArtifact {
        summary: report.summary,
        per_query: if args.per_query {
            report.per_query
        } else {
            BTreeMap::new()
        },
    };
    write_json_pretty(&json_path, &artifact)?;

    let table_path = outdir.join("metrics.md");
    fs::write(&table_path, format!("{table}\n"))
        .with_context(|| format!("failed to write metrics table: {}", table_path.display()))?;

    info!(
        path = %json_path.display(),
        conditions = artifact.summary.len(),
        "saved metrics"
    );
    info!(path = %table_path.display(), "saved table");
    Ok(())
}
