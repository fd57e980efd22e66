use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Resolved on-disk layout: the feature store file and the name-index
/// directory under one root. Both are created during resolution, so
/// callers never deal with a half-initialized layout.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
    features_db: PathBuf,
    index_dir: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The GAZETTEER_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/gazetteer/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("GAZETTEER_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("gazetteer")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        let index_dir = root.join("names");
        std::fs::create_dir_all(&index_dir)
            .map_err(|_| Error::DataDir(index_dir.clone()))?;

        Ok(Self {
            features_db: root.join("features.redb"),
            index_dir,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the redb feature store.
    pub fn features_db(&self) -> &Path {
        &self.features_db
    }

    /// Directory holding the full-text name index.
    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }
}
