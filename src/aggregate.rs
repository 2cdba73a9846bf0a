//! Groups ranking records into conditions and reduces them to per-query and
//! per-condition metric tables.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::metrics::{mrr, ndcg_at_k, recall_at_k};
use crate::model::{QuerySet, RankingRecord};

/// Metric-name → value rows, keyed by condition (summary) and by
/// `condition|slug` (per query). `BTreeMap` keeps both report sections
/// sorted by key so rendering is reproducible byte for byte.
#[derive(Debug, Default, Serialize)]
pub struct MetricsReport {
    pub summary: BTreeMap<String, BTreeMap<String, f64>>,
    pub per_query: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Score every ranking record against the registered judgments and reduce
/// per condition.
///
/// Records whose slug has no registered query are skipped silently; the
/// rankings file may cover a superset of the current query set. A known
/// slug with no judgments for the record's docset still contributes, with
/// every metric at 0.0. Conditions left with zero contributing queries are
/// omitted from the summary rather than emitted as placeholders, and the
/// reduction is a per-metric arithmetic mean, so record order never affects
/// the output.
pub fn summarize(
    queries: &QuerySet,
    rankings: &[RankingRecord],
    k_values: &[usize],
) -> MetricsReport {
    let mut grouped = BTreeMap::<String, Vec<&RankingRecord>>::new();
    for record in rankings {
        grouped
            .entry(record.condition_key())
            .or_default()
            .push(record);
    }

    let mut report = MetricsReport::default();
    for (condition, records) in grouped {
        let mut buckets = BTreeMap::<String, Vec<f64>>::new();

        for record in records {
            let Some(relevant) = queries.relevant_for(&record.query_slug, &record.docset) else {
                continue;
            };

            let results = record.result_ids();
            let row = score_ranking(&results, relevant, k_values);
            for (metric, value) in &row {
                buckets.entry(metric.clone()).or_default().push(*value);
            }
            report
                .per_query
                .insert(format!("{condition}|{}", record.query_slug), row);
        }

        if buckets.is_empty() {
            continue;
        }

        let summary_row = buckets
            .into_iter()
            .map(|(metric, values)| {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                (metric, mean)
            })
            .collect::<BTreeMap<String, f64>>();
        report.summary.insert(condition, summary_row);
    }

    report
}

fn score_ranking(results: &[i64], relevant: &[i64], k_values: &[usize]) -> BTreeMap<String, f64> {
    let mut row = BTreeMap::new();
    row.insert("MRR".to_string(), mrr(results, relevant));
    for k in k_values {
        row.insert(format!("recall@{k}"), recall_at_k(results, relevant, *k));
        row.insert(format!("nDCG@{k}"), ndcg_at_k(results, relevant, *k));
    }
    row
}

/// Render the summary as a pipe table: one row per condition, sorted by
/// condition key, values to three decimal places.
pub fn render_markdown(
    summary: &BTreeMap<String, BTreeMap<String, f64>>,
    k_values: &[usize],
) -> String {
    let mut headers = vec!["Condition".to_string(), "MRR".to_string()];
    headers.extend(k_values.iter().map(|k| format!("recall@{k}")));
    headers.extend(k_values.iter().map(|k| format!("nDCG@{k}")));

    let mut lines = vec![
        format!("| {} |", headers.join(" | ")),
        format!("|{}", "---|".repeat(headers.len())),
    ];

    for (condition, metrics) in summary {
        let mut row = vec![condition.clone(), format_metric(metrics, "MRR")];
        for k in k_values {
            row.push(format_metric(metrics, &format!("recall@{k}")));
        }
        for k in k_values {
            row.push(format_metric(metrics, &format!("nDCG@{k}")));
        }
        lines.push(format!("| {} |", row.join(" | ")));
    }

    lines.join("\n")
}

fn format_metric(metrics: &BTreeMap<String, f64>, name: &str) -> String {
    format!("{:.3}", metrics.get(name).copied().unwrap_or(0.0))
}
