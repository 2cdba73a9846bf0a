//! Batch-embed documents that are missing or stale for one model.

use anyhow::Result;
use tracing::info;

use crate::cli::EmbedArgs;
use crate::embedding::{EmbeddingProvider, HttpEmbeddingClient};
use crate::store::DocumentStore;

pub fn run(args: EmbedArgs) -> Result<()> {
    let db_path = super::resolve_db_path(&args.cache_root, args.db_path.as_deref());
    let store = DocumentStore::open(&db_path)?;
    let embedder = HttpEmbeddingClient::new(&args.embed_url)?;

    let embedded = embed_pending(&store, &embedder, &args)?;
    if embedded == 0 {
        info!(model = %args.model, "no documents to embed");
    } else {
        info!(model = %args.model, embedded, "embedding refresh completed");
    }
    Ok(())
}

fn embed_pending(
    store: &DocumentStore,
    embedder: &dyn EmbeddingProvider,
    args: &EmbedArgs,
) -> Result<usize> {
    let dims = store.model_dims(&args.model)?;
    let pending = store.documents_to_embed(&args.model, dims, args.force, args.limit)?;
    if pending.is_empty() {
        return Ok(0);
    }

    info!(
        model = %args.model,
        dims,
        pending = pending.len(),
        "embedding documents"
    );

    let batch_size = args.batch_size.max(1);
    let mut embedded = 0_usize;
    for batch in pending.chunks(batch_size) {
        let inputs = batch
            .iter()
            .map(|(_, content)| content.clone())
            .collect::<Vec<String>>();
        let vectors = embedder.embed_batch(&args.model, &inputs)?;

        for ((document_id, _), vector) in batch.iter().zip(vectors.iter()) {
            // upsert_embedding rejects vectors whose width disagrees with
            // the registered dimension.
            store.upsert_embedding(*document_id, &args.model, dims, vector)?;
            embedded += 1;
        }
        info!(model = %args.model, embedded, total = pending.len(), "embed batch committed");
    }

    Ok(embedded)
}

#[cfg(test)]
mod tests {
    use super::embed_pending;
    use crate::cli::EmbedArgs;
    use crate::embedding::EmbeddingProvider;
    use crate::store::DocumentStore;

    use std::cell::RefCell;
    use std::path::PathBuf;

    use anyhow::Result;

    struct BatchCountingEmbedder {
        dims: usize,
        batches: RefCell<Vec<usize>>,
    }

    impl BatchCountingEmbedder {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                batches: RefCell::new(Vec::new()),
            }
        }
    }

    impl EmbeddingProvider for BatchCountingEmbedder {
        fn embed_batch(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batches.borrow_mut().push(inputs.len());
            Ok(inputs.iter().map(|_| vec![0.5; self.dims]).collect())
        }
    }

    fn args(batch_size: usize, force: bool) -> EmbedArgs {
        EmbedArgs {
            cache_root: PathBuf::new(),
            db_path: None,
            model: "m1".to_string(),
            embed_url: "http://unused".to_string(),
            batch_size,
            limit: 0,
            force,
        }
    }

    fn seeded_store() -> DocumentStore {
        let store = DocumentStore::open_in_memory().expect("store should open");
        store.register_model("m1", 3).expect("register");
        for index in 0..5 {
            store
                .insert_document("seed2", &format!("doc {index}"), "body")
                .expect("insert");
        }
        store
    }

    #[test]
    fn embeds_pending_documents_in_batches() {
        let store = seeded_store();
        let embedder = BatchCountingEmbedder::new(3);

        let embedded = embed_pending(&store, &embedder, &args(2, false)).expect("embed");
        assert_eq!(embedded, 5);
        assert_eq!(*embedder.batches.borrow(), vec![2, 2, 1]);

        // Second pass finds nothing stale.
        let again = embed_pending(&store, &embedder, &args(2, false)).expect("embed");
        assert_eq!(again, 0);
    }

    #[test]
    fn force_reembeds_everything() {
        let store = seeded_store();
        let embedder = BatchCountingEmbedder::new(3);
        embed_pending(&store, &embedder, &args(10, false)).expect("embed");

        let forced = embed_pending(&store, &embedder, &args(10, true)).expect("embed");
        assert_eq!(forced, 5);
    }
}
