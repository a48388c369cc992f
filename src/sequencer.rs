use crate::error::PlaylistError;
use crate::model::{Clip, ClipId};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextReason {
    FirstRun,
    Following,
    Wrapped,
    StaleMarker,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextClip<'a> {
    pub clip: &'a Clip,
    pub reason: NextReason,
}

pub fn next<'a>(
    active: &[&'a Clip],
    last_played: Option<ClipId>,
) -> Result<&'a Clip, PlaylistError> {
    next_with_reason(active, last_played).map(|next| next.clip)
}

pub fn next_with_reason<'a>(
    active: &[&'a Clip],
    last_played: Option<ClipId>,
) -> Result<NextClip<'a>, PlaylistError> {
    let first = *active.first().ok_or(PlaylistError::EmptyPlaylist)?;

    let Some(last_id) = last_played else {
        return Ok(NextClip {
            clip: first,
            reason: NextReason::FirstRun,
        });
    };

    match active.iter().position(|clip| clip.id == last_id) {
        Some(pos) if pos + 1 < active.len() => Ok(NextClip {
            clip: active[pos + 1],
            reason: NextReason::Following,
        }),
        Some(_) => Ok(NextClip {
            clip: first,
            reason: NextReason::Wrapped,
        }),
        None => {
            warn!(
                last_played = %last_id,
                restart_at = %first.id,
                "last played clip is no longer active, restarting from the first clip"
            );
            Ok(NextClip {
                clip: first,
                reason: NextReason::StaleMarker,
            })
        }
    }
}

pub fn start_from<'a>(active: &[&'a Clip], id: ClipId) -> Result<&'a Clip, PlaylistError> {
    active
        .iter()
        .copied()
        .find(|clip| clip.id == id)
        .ok_or(PlaylistError::ClipNotFound(id))
}
