use crate::config;
use crate::model::{ClipId, PlaylistState};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ResumeTracker {
    path: PathBuf,
    state: PlaylistState,
}

impl ResumeTracker {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = read_state(&path);
        Self { path, state }
    }

    pub fn get(&self) -> Option<ClipId> {
        self.state.last_played_id
    }

    pub fn reload(&mut self) -> Option<ClipId> {
        self.state = read_state(&self.path);
        self.get()
    }

    /// Records `id` as the last completed clip. Call only after the player
    /// reported success. The in-memory value changes only once the write landed.
    pub fn advance(&mut self, id: ClipId) -> Result<()> {
        let next = PlaylistState {
            last_played_id: Some(id),
        };
        config::atomic_write_json(&self.path, &next)
            .with_context(|| format!("failed to persist resume position {id}"))?;
        self.state = next;
        info!(last_played = %id, "resume position saved");
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        let next = PlaylistState::default();
        config::atomic_write_json(&self.path, &next)
            .context("failed to clear resume position")?;
        self.state = next;
        info!("resume position cleared");
        Ok(())
    }
}

fn read_state(path: &Path) -> PlaylistState {
    if !path.exists() {
        debug!(path = %path.display(), "no resume file yet");
        return PlaylistState::default();
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot read resume file, starting from the beginning");
            return PlaylistState::default();
        }
    };

    match serde_json::from_str::<PlaylistState>(&raw) {
        Ok(state) => state,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "resume file is empty or invalid, starting from the beginning");
            PlaylistState::default()
        }
    }
}
