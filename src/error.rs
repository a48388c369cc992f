use crate::model::ClipId;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("no active clips to play; run `cliploop rebuild` against a folder with videos")]
    EmptyPlaylist,

    #[error("clip {0} is not in the active playlist")]
    ClipNotFound(ClipId),

    #[error("metadata store {path} is corrupt: {source}")]
    CorruptStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PlaylistError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EmptyPlaylist)
    }
}

pub fn is_corrupt_store(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PlaylistError>(),
        Some(PlaylistError::CorruptStore { .. })
    )
}
