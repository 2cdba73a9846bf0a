use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::DocumentStore;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = super::resolve_db_path(&args.cache_root, args.db_path.as_deref());

    if !db_path.exists() {
        warn!(path = %db_path.display(), "document store missing");
        return Ok(());
    }

    let store = DocumentStore::open(&db_path)?;
    let status = store.status()?;

    info!(
        path = %db_path.display(),
        documents = status.document_count,
        "document store"
    );
    for (docset, count) in &status.docsets {
        info!(docset = %docset, documents = count, "docset");
    }
    if status.models.is_empty() {
        warn!("no embedding models registered");
    }
    for (model, dims, embeddings) in &status.models {
        info!(model = %model, dims, embeddings, "embedding model");
    }

    Ok(())
}
