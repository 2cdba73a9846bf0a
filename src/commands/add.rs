//! Insert one document and its embedding in a single pass.

use anyhow::Result;
use tracing::info;

use crate::cli::{AddArgs, EmbedField};
use crate::embedding::{EmbeddingProvider, HttpEmbeddingClient, QueryEmbeddingCache};
use crate::store::{DocumentStore, embeddable_content};

pub fn run(args: AddArgs) -> Result<()> {
    let db_path = super::resolve_db_path(&args.cache_root, args.db_path.as_deref());
    let store = DocumentStore::open(&db_path)?;
    let embedder = HttpEmbeddingClient::new(&args.embed_url)?;

    let document_id = insert_with_embedding(&store, &embedder, &args)?;

    info!(
        document_id,
        model = %args.model,
        docset = %args.docset,
        "inserted document with embedding"
    );
    Ok(())
}

fn insert_with_embedding(
    store: &DocumentStore,
    embedder: &dyn EmbeddingProvider,
    args: &AddArgs,
) -> Result<i64> {
    let dims = store.model_dims(&args.model)?;

    // Embedding the indexed content keeps query-time vectors comparable to
    // what the search backend scores against.
    let text_for_embedding = match args.embed_field {
        EmbedField::Content => embeddable_content(&args.title, &args.body),
        EmbedField::Body => args.body.clone(),
    };
    let mut cache = QueryEmbeddingCache::default();
    let vector = cache.embed_query(embedder, &args.model, &text_for_embedding, dims)?;

    let document_id = store.insert_document(&args.docset, &args.title, &args.body)?;
    store.upsert_embedding(document_id, &args.model, dims, &vector)?;
    Ok(document_id)
}

#[cfg(test)]
mod tests {
    use super::insert_with_embedding;
    use crate::cli::{AddArgs, EmbedField};
    use crate::embedding::EmbeddingProvider;
    use crate::store::DocumentStore;

    use std::path::PathBuf;

    use anyhow::Result;

    struct UnitEmbedder;

    impl EmbeddingProvider for UnitEmbedder {
        fn embed_batch(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn args(model: &str) -> AddArgs {
        AddArgs {
            cache_root: PathBuf::new(),
            db_path: None,
            title: "Rust ownership".to_string(),
            body: "borrowing rules".to_string(),
            docset: "cli".to_string(),
            model: model.to_string(),
            embed_url: "http://unused".to_string(),
            embed_field: EmbedField::Content,
        }
    }

    #[test]
    fn inserts_document_and_embedding() {
        let store = DocumentStore::open_in_memory().expect("store should open");
        store.register_model("m1", 2).expect("register");

        let document_id =
            insert_with_embedding(&store, &UnitEmbedder, &args("m1")).expect("insert");
        assert_eq!(document_id, 1);

        let status = store.status().expect("status");
        assert_eq!(status.document_count, 1);
        assert_eq!(status.models, vec![("m1".to_string(), 2, 1)]);
    }

    #[test]
    fn unregistered_model_leaves_store_untouched() {
        let store = DocumentStore::open_in_memory().expect("store should open");
        let error = insert_with_embedding(&store, &UnitEmbedder, &args("ghost"))
            .expect_err("unregistered model must fail");
        assert!(error.to_string().contains("not registered"));
        assert_eq!(store.status().expect("status").document_count, 0);
    }
}
