//! SQLite document store: the text-search and vector-search collaborators.
//!
//! Tables mirror the backend under evaluation: `documents` partitioned by
//! docset, `embedding_models` as the model registry, and
//! `document_embeddings` holding one little-endian f32 blob per
//! (document, model) pair.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};

use crate::embedding::{cosine_distance, decode_embedding_blob, encode_embedding_blob};
use crate::fusion::{TextCandidate, VectorCandidate};
use crate::util::{ensure_directory, now_utc_string};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS documents (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  docset TEXT NOT NULL,
  title TEXT NOT NULL,
  body TEXT NOT NULL,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_docset ON documents(docset);

CREATE TABLE IF NOT EXISTS embedding_models (
  name TEXT PRIMARY KEY,
  dims INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS document_embeddings (
  document_id INTEGER NOT NULL REFERENCES documents(id),
  model TEXT NOT NULL,
  dims INTEGER NOT NULL,
  embedding BLOB NOT NULL,
  created_at TEXT NOT NULL,
  PRIMARY KEY (document_id, model)
);
";

pub struct DocumentStore {
    connection: Connection,
}

/// Summary counts for the status command.
#[derive(Debug)]
pub struct StoreStatus {
    pub document_count: i64,
    pub docsets: Vec<(String, i64)>,
    pub models: Vec<(String, usize, i64)>,
}

impl DocumentStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_directory(parent)?;
            }
        }
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open document store: {}", path.display()))?;
        let store = Self { connection };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory document store")?;
        let store = Self { connection };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.connection
            .execute_batch(SCHEMA_SQL)
            .context("failed to initialize document store schema")
    }

    pub fn register_model(&self, name: &str, dims: usize) -> Result<()> {
        self.connection
            .execute(
                "INSERT INTO embedding_models (name, dims) VALUES (?1, ?2)
                 ON CONFLICT (name) DO UPDATE SET dims = excluded.dims",
                params![name, dims as i64],
            )
            .with_context(|| format!("failed to register embedding model '{name}'"))?;
        Ok(())
    }

    /// Registered dimension for a model, or an error naming the model when
    /// it is absent. Callers never embed against an unregistered model.
    pub fn model_dims(&self, model: &str) -> Result<usize> {
        let dims: Option<i64> = self
            .connection
            .query_row(
                "SELECT dims FROM embedding_models WHERE name = ?1",
                [model],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to look up embedding model '{model}'"))?;

        match dims {
            Some(dims) if dims > 0 => Ok(dims as usize),
            Some(dims) => bail!("embedding model '{model}' has invalid dims {dims}"),
            None => bail!(
                "embedding model '{model}' is not registered; register it with its dimension first"
            ),
        }
    }

    pub fn model_dims_map(&self, models: &[String]) -> Result<HashMap<String, usize>> {
        let missing = models
            .iter()
            .filter(|model| {
                self.connection
                    .query_row(
                        "SELECT 1 FROM embedding_models WHERE name = ?1",
                        [model.as_str()],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()
                    .ok()
                    .flatten()
                    .is_none()
            })
            .cloned()
            .collect::<Vec<String>>();
        if !missing.is_empty() {
            bail!(
                "missing dims for models: {}; register them in embedding_models first",
                missing.join(", ")
            );
        }

        let mut map = HashMap::with_capacity(models.len());
        for model in models {
            map.insert(model.clone(), self.model_dims(model)?);
        }
        Ok(map)
    }

    pub fn insert_document(&self, docset: &str, title: &str, body: &str) -> Result<i64> {
        self.connection
            .execute(
                "INSERT INTO documents (docset, title, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![docset, title, body, now_utc_string()],
            )
            .with_context(|| format!("failed to insert document '{title}'"))?;
        Ok(self.connection.last_insert_rowid())
    }

    pub fn upsert_embedding(
        &self,
        document_id: i64,
        model: &str,
        dims: usize,
        vector: &[f32],
    ) -> Result<()> {
        if vector.len() != dims {
            bail!(
                "embedding for document {document_id} has {} dims, expected {dims}",
                vector.len()
            );
        }

        self.connection
            .execute(
                "INSERT INTO document_embeddings (document_id, model, dims, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (document_id, model) DO UPDATE SET
                   embedding = excluded.embedding,
                   dims = excluded.dims,
                   created_at = excluded.created_at",
                params![
                    document_id,
                    model,
                    dims as i64,
                    encode_embedding_blob(vector),
                    now_utc_string()
                ],
            )
            .with_context(|| {
                format!("failed to upsert embedding for document {document_id} model '{model}'")
            })?;
        Ok(())
    }

    /// Documents still needing an embedding for `model`: missing rows, rows
    /// stored under a different dimension, or everything when `force` is
    /// set. Returns (id, embeddable content) ordered by id; `limit == 0`
    /// means no limit.
    pub fn documents_to_embed(
        &self,
        model: &str,
        dims: usize,
        force: bool,
        limit: usize,
    ) -> Result<Vec<(i64, String)>> {
        let mut statement = self.connection.prepare(
            "
            SELECT d.id, d.title, d.body
            FROM documents d
            LEFT JOIN document_embeddings e
              ON e.document_id = d.id AND e.model = ?1
            WHERE ?2 OR e.document_id IS NULL OR e.dims <> ?3
            ORDER BY d.id
            ",
        )?;

        let mut rows = statement.query(params![model, force, dims as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            if limit > 0 && out.len() >= limit {
                break;
            }
            let id: i64 = row.get(0)?;
            let title: String = row.get(1)?;
            let body: String = row.get(2)?;
            out.push((id, embeddable_content(&title, &body)));
        }
        Ok(out)
    }

    /// Lexical search over a docset: token-frequency scoring of the query
    /// terms against title + body, higher score first, ties by ascending
    /// document id, truncated to `limit`.
    pub fn text_search(
        &self,
        query_text: &str,
        docset: &str,
        limit: usize,
    ) -> Result<Vec<TextCandidate>> {
        let tokens = query_tokens(query_text);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut statement = self.connection.prepare(
            "SELECT id, title, body FROM documents WHERE docset = ?1 ORDER BY id ASC",
        )?;
        let mut rows = statement.query([docset])?;

        let mut candidates = Vec::<TextCandidate>::new();
        while let Some(row) = rows.next()? {
            let document_id: i64 = row.get(0)?;
            let title: String = row.get(1)?;
            let body: String = row.get(2)?;

            let score = lexical_score(&tokens, &title, &body);
            if score > 0.0 {
                candidates.push(TextCandidate {
                    document_id,
                    title,
                    score,
                });
            }
        }

        candidates.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.document_id.cmp(&right.document_id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    /// Nearest documents by cosine distance for one model within a docset,
    /// closest first, ties by ascending document id, truncated to `limit`.
    /// Rows stored under a stale dimension are skipped.
    pub fn vector_search(
        &self,
        query_vector: &[f32],
        model: &str,
        docset: &str,
        limit: usize,
    ) -> Result<Vec<VectorCandidate>> {
        let mut statement = self.connection.prepare(
            "
            SELECT d.id, d.title, e.embedding, e.dims
            FROM document_embeddings e
            JOIN documents d ON d.id = e.document_id
            WHERE e.model = ?1 AND d.docset = ?2
            ORDER BY d.id ASC
            ",
        )?;
        let mut rows = statement.query(params![model, docset])?;

        let mut candidates = Vec::<VectorCandidate>::new();
        while let Some(row) = rows.next()? {
            let document_id: i64 = row.get(0)?;
            let title: String = row.get(1)?;
            let blob: Vec<u8> = row.get(2)?;
            let dims = row.get::<_, i64>(3)? as usize;

            if dims != query_vector.len() {
                continue;
            }
            let Some(embedding) = decode_embedding_blob(&blob, dims) else {
                continue;
            };

            let distance = cosine_distance(query_vector, &embedding);
            candidates.push(VectorCandidate {
                document_id,
                title,
                distance,
                similarity: 1.0 - distance,
            });
        }

        candidates.sort_by(|left, right| {
            left.distance
                .total_cmp(&right.distance)
                .then_with(|| left.document_id.cmp(&right.document_id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    pub fn status(&self) -> Result<StoreStatus> {
        let document_count: i64 =
            self.connection
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

        let mut docsets = Vec::new();
        let mut statement = self.connection.prepare(
            "SELECT docset, COUNT(*) FROM documents GROUP BY docset ORDER BY docset ASC",
        )?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            docsets.push((row.get::<_, String>(0)?, row.get::<_, i64>(1)?));
        }

        let mut models = Vec::new();
        let mut statement = self.connection.prepare(
            "
            SELECT m.name, m.dims, COUNT(e.document_id)
            FROM embedding_models m
            LEFT JOIN document_embeddings e ON e.model = m.name
            GROUP BY m.name, m.dims
            ORDER BY m.name ASC
            ",
        )?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            models.push((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? as usize,
                row.get::<_, i64>(2)?,
            ));
        }

        Ok(StoreStatus {
            document_count,
            docsets,
            models,
        })
    }
}

/// The text that gets embedded for a document: title and body joined, the
/// same shape the backend indexes.
pub fn embeddable_content(title: &str, body: &str) -> String {
    format!("{title}\n{body}")
}

fn query_tokens(query_text: &str) -> Vec<String> {
    let mut tokens = query_text
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| token.len() >= 2)
        .map(str::to_string)
        .collect::<Vec<String>>();
    tokens.sort();
    tokens.dedup();
    tokens
}

fn lexical_score(query_tokens: &[String], title: &str, body: &str) -> f64 {
    let haystack = format!("{} {}", title.to_lowercase(), body.to_lowercase());
    let mut matched = 0_usize;
    let mut occurrences = 0_usize;
    for token in query_tokens {
        let count = haystack.matches(token.as_str()).count();
        if count > 0 {
            matched += 1;
            occurrences += count;
        }
    }

    if matched == 0 {
        return 0.0;
    }

    // Coverage dominates; raw term frequency only separates documents that
    // match the same number of distinct terms.
    matched as f64 / query_tokens.len() as f64 + occurrences as f64 * 1e-3
}

#[cfg(test)]
mod tests {
    use super::{DocumentStore, embeddable_content};

    fn seeded_store() -> DocumentStore {
        let store = DocumentStore::open_in_memory().expect("in-memory store should open");
        store
            .insert_document("seed2", "Rust ownership", "ownership and borrowing in rust")
            .expect("insert should succeed");
        store
            .insert_document("seed2", "Garbage collection", "tracing garbage collectors")
            .expect("insert should succeed");
        store
            .insert_document("seed2", "Rust lifetimes", "lifetimes annotate borrowing")
            .expect("insert should succeed");
        store
            .insert_document("other", "Rust macros", "declarative rust macros")
            .expect("insert should succeed");
        store
    }

    #[test]
    fn text_search_scores_coverage_and_respects_docset() {
        let store = seeded_store();
        let hits = store
            .text_search("rust borrowing", "seed2", 10)
            .expect("search should succeed");

        let ids = hits.iter().map(|hit| hit.document_id).collect::<Vec<i64>>();
        assert_eq!(ids, vec![1, 3], "doc 4 is in another docset, doc 2 no match");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn text_search_truncates_and_orders_deterministically() {
        let store = seeded_store();
        // "borrowing" appears once in doc 1 and once in doc 3: equal scores
        // fall back to ascending id, then the limit truncates.
        let hits = store
            .text_search("borrowing", "seed2", 1)
            .expect("search should succeed");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, 1);
    }

    #[test]
    fn text_search_with_no_usable_tokens_is_empty() {
        let store = seeded_store();
        let hits = store
            .text_search("  ! ?", "seed2", 10)
            .expect("search should succeed");
        assert!(hits.is_empty());
    }

    #[test]
    fn vector_search_orders_by_cosine_distance() {
        let store = seeded_store();
        store
            .register_model("m1", 3)
            .expect("model registration should succeed");
        store
            .upsert_embedding(1, "m1", 3, &[1.0, 0.0, 0.0])
            .expect("upsert should succeed");
        store
            .upsert_embedding(2, "m1", 3, &[0.0, 1.0, 0.0])
            .expect("upsert should succeed");
        store
            .upsert_embedding(3, "m1", 3, &[0.7, 0.7, 0.0])
            .expect("upsert should succeed");

        let hits = store
            .vector_search(&[1.0, 0.0, 0.0], "m1", "seed2", 2)
            .expect("search should succeed");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, 1);
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[1].document_id, 3);
        assert!((hits[1].similarity - 0.7_f64.hypot(0.7).recip() * 0.7).abs() < 1e-3);
    }

    #[test]
    fn vector_search_skips_stale_dimensions() {
        let store = seeded_store();
        store.register_model("m1", 2).expect("register");
        store
            .upsert_embedding(1, "m1", 2, &[1.0, 0.0])
            .expect("upsert should succeed");

        let hits = store
            .vector_search(&[1.0, 0.0, 0.0], "m1", "seed2", 10)
            .expect("search should succeed");
        assert!(hits.is_empty(), "2-dim rows must not match a 3-dim query");
    }

    #[test]
    fn model_registry_round_trips_and_rejects_unknown() {
        let store = seeded_store();
        store.register_model("m1", 768).expect("register");
        assert_eq!(store.model_dims("m1").expect("dims should resolve"), 768);

        let error = store
            .model_dims("ghost")
            .expect_err("unknown model must fail");
        assert!(error.to_string().contains("'ghost' is not registered"));

        let error = store
            .model_dims_map(&["m1".to_string(), "ghost".to_string()])
            .expect_err("map lookup must name missing models");
        assert!(error.to_string().contains("missing dims for models: ghost"));
    }

    #[test]
    fn documents_to_embed_selects_missing_and_stale_rows() {
        let store = seeded_store();
        store.register_model("m1", 2).expect("register");
        store
            .upsert_embedding(1, "m1", 2, &[1.0, 0.0])
            .expect("upsert should succeed");

        let pending = store
            .documents_to_embed("m1", 2, false, 0)
            .expect("selection should succeed");
        let ids = pending.iter().map(|(id, _)| *id).collect::<Vec<i64>>();
        assert_eq!(ids, vec![2, 3, 4], "document 1 is already embedded");
        assert_eq!(pending[0].1, embeddable_content("Garbage collection", "tracing garbage collectors"));

        let forced = store
            .documents_to_embed("m1", 2, true, 2)
            .expect("forced selection should succeed");
        assert_eq!(forced.len(), 2, "limit caps the batch");
        assert_eq!(forced[0].0, 1, "force re-selects embedded documents");
    }

    #[test]
    fn status_reports_counts_per_docset_and_model() {
        let store = seeded_store();
        store.register_model("m1", 2).expect("register");
        store
            .upsert_embedding(1, "m1", 2, &[1.0, 0.0])
            .expect("upsert should succeed");

        let status = store.status().expect("status should succeed");
        assert_eq!(status.document_count, 4);
        assert_eq!(
            status.docsets,
            vec![("other".to_string(), 1), ("seed2".to_string(), 3)]
        );
        assert_eq!(status.models, vec![("m1".to_string(), 2, 1)]);
    }
}
