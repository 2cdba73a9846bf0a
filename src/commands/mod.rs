use std::path::{Path, PathBuf};

pub mod add;
pub mod embed;
pub mod metrics;
pub mod run;
pub mod status;

const STORE_FILENAME: &str = "rankeval.sqlite";

pub(crate) fn resolve_db_path(cache_root: &Path, db_path: Option<&Path>) -> PathBuf {
    db_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cache_root.join(STORE_FILENAME))
}
