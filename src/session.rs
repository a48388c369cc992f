use crate::error::{PlaylistError, is_corrupt_store};
use crate::model::{Clip, ClipId};
use crate::player::{PlaybackOutcome, Player};
use crate::reconcile;
use crate::resume::ResumeTracker;
use crate::sequencer;
use crate::store::ClipStore;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

static PROCESS_STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Cooperative stop flag, checked before each clip and never mid-playback.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    process_signals: bool,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_process_signals() -> Self {
        install_signal_handlers();
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            process_signals: true,
        }
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || (self.process_signals && PROCESS_STOP_REQUESTED.load(Ordering::SeqCst))
    }
}

#[cfg(unix)]
extern "C" fn on_stop_signal(_signum: libc::c_int) {
    PROCESS_STOP_REQUESTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn install_signal_handlers() {
    for signum in [libc::SIGINT, libc::SIGTERM] {
        let installed = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_stop_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(signum, &action, std::ptr::null_mut()) == 0
        };
        if !installed {
            warn!(signum, "could not install stop signal handler");
        }
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Start {
    Resume,
    At(ClipId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Played {
    pub clip: Clip,
    pub outcome: PlaybackOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    CountReached,
    PlaybackFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    pub played: Vec<Played>,
    pub stop_reason: StopReason,
}

// Folders to rebuild the store from when it turns out to be corrupt.
#[derive(Debug, Clone)]
struct Rescan {
    folders: Vec<PathBuf>,
    extensions: Vec<String>,
}

pub struct Session<P: Player> {
    store_path: PathBuf,
    tracker: ResumeTracker,
    player: P,
    stop: StopSignal,
    rescan: Option<Rescan>,
}

impl<P: Player> Session<P> {
    pub fn new(store_path: PathBuf, tracker: ResumeTracker, player: P, stop: StopSignal) -> Self {
        Self {
            store_path,
            tracker,
            player,
            stop,
            rescan: None,
        }
    }

    pub fn with_rescan(mut self, folders: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        self.rescan = Some(Rescan {
            folders,
            extensions,
        });
        self
    }

    pub fn tracker(&self) -> &ResumeTracker {
        &self.tracker
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn play_next(&mut self) -> Result<Played> {
        self.play_once(Start::Resume)
    }

    pub fn play_from(&mut self, id: ClipId) -> Result<Played> {
        self.play_once(Start::At(id))
    }

    pub fn play_once(&mut self, start: Start) -> Result<Played> {
        let clip = self.choose_playable(start)?;
        info!(id = %clip.id, name = %clip.name, path = %clip.file_path.display(), "starting playback");

        let outcome = self.player.play(&clip)?;
        if outcome.success {
            self.tracker.advance(clip.id)?;
            info!(id = %clip.id, "finished playback");
        } else {
            warn!(
                id = %clip.id,
                detail = outcome.failure_detail.as_deref().unwrap_or("unknown"),
                "playback failed or was interrupted, resume position not updated"
            );
        }
        Ok(Played { clip, outcome })
    }

    pub fn run_loop(&mut self, start: Start, count: Option<usize>) -> Result<LoopSummary> {
        let mut played = Vec::new();
        let mut next_start = start;

        loop {
            if self.stop.is_requested() {
                info!("stop requested, leaving playback loop");
                return Ok(LoopSummary {
                    played,
                    stop_reason: StopReason::Requested,
                });
            }
            if count.is_some_and(|limit| played.len() >= limit) {
                return Ok(LoopSummary {
                    played,
                    stop_reason: StopReason::CountReached,
                });
            }

            let result = self.play_once(next_start)?;
            next_start = Start::Resume;
            let failed = !result.outcome.success;
            played.push(result);
            if failed {
                return Ok(LoopSummary {
                    played,
                    stop_reason: StopReason::PlaybackFailed,
                });
            }
        }
    }

    fn choose_playable(&mut self, start: Start) -> Result<Clip> {
        let mut start = start;
        self.tracker.reload();
        loop {
            let mut store = self.load_store()?;
            let chosen = {
                let active = store.active_clips();
                choose(&active, start, self.tracker.get())?.clone()
            };

            if chosen.file_path.exists() {
                return Ok(chosen);
            }

            warn!(id = %chosen.id, path = %chosen.file_path.display(), "clip file is gone, marking missing and choosing again");
            store.mark_missing(chosen.id);
            store.save(&self.store_path)?;
            if start == Start::At(chosen.id) {
                start = Start::Resume;
            }
        }
    }

    fn load_store(&mut self) -> Result<ClipStore> {
        let Some(rescan) = self.rescan.clone() else {
            return ClipStore::load_or_default(&self.store_path);
        };
        match ClipStore::load(&self.store_path) {
            Err(err) if is_corrupt_store(&err) => {
                let detail = format!("{err:#}");
                warn!(error = %detail, "metadata store is corrupt, rebuilding it from the video folders");
                let (store, _) =
                    reconcile::rebuild(&self.store_path, &rescan.folders, &rescan.extensions, None)?;
                // Ids were handed out again, so the old marker means nothing.
                self.tracker.reset()?;
                Ok(store)
            }
            other => other,
        }
    }
}

fn choose<'a>(
    active: &[&'a Clip],
    start: Start,
    last_played: Option<ClipId>,
) -> Result<&'a Clip, PlaylistError> {
    match start {
        Start::Resume => sequencer::next(active, last_played),
        Start::At(id) => match sequencer::start_from(active, id) {
            Ok(clip) => Ok(clip),
            Err(PlaylistError::ClipNotFound(id)) => {
                warn!(requested = %id, "requested clip is not active, starting from the first clip");
                sequencer::next(active, None)
            }
            Err(err) => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClipStatus;
    use std::fs;
    use std::path::Path;
    use tempfile::{TempDir, tempdir};

    struct ScriptedPlayer {
        played: Vec<ClipId>,
        fail_on: Vec<ClipId>,
        stop_after: Option<(usize, StopSignal)>,
    }

    impl ScriptedPlayer {
        fn new() -> Self {
            Self {
                played: Vec::new(),
                fail_on: Vec::new(),
                stop_after: None,
            }
        }
    }

    impl Player for ScriptedPlayer {
        fn play(&mut self, clip: &Clip) -> Result<PlaybackOutcome> {
            self.played.push(clip.id);
            if let Some((after, stop)) = &self.stop_after {
                if self.played.len() >= *after {
                    stop.request_stop();
                }
            }
            if self.fail_on.contains(&clip.id) {
                return Ok(PlaybackOutcome::failed("decoder error"));
            }
            Ok(PlaybackOutcome::completed())
        }
    }

    fn fixture(count: u64) -> (TempDir, PathBuf, PathBuf) {
        let dir = tempdir().expect("tempdir");
        let mut store = ClipStore::new();
        for n in 1..=count {
            let path = dir.path().join(format!("{n}.mp4"));
            fs::write(&path, b"x").expect("write clip");
            store.upsert(Clip::new(ClipId(n), format!("clip {n}"), path));
        }
        let store_path = dir.path().join("playlist.json");
        store.save(&store_path).expect("save store");
        let progress_path = dir.path().join("progress.json");
        (dir, store_path, progress_path)
    }

    fn session(
        store_path: &Path,
        progress_path: &Path,
        player: ScriptedPlayer,
    ) -> Session<ScriptedPlayer> {
        Session::new(
            store_path.to_path_buf(),
            ResumeTracker::open(progress_path),
            player,
            StopSignal::new(),
        )
    }

    #[test]
    fn play_once_advances_after_success() {
        let (_dir, store_path, progress_path) = fixture(3);
        let mut session = session(&store_path, &progress_path, ScriptedPlayer::new());

        let played = session.play_once(Start::Resume).expect("play");
        assert_eq!(played.clip.id, ClipId(1));
        assert_eq!(session.tracker().get(), Some(ClipId(1)));
        assert_eq!(ResumeTracker::open(&progress_path).get(), Some(ClipId(1)));
    }

    #[test]
    fn failed_playback_does_not_advance() {
        let (_dir, store_path, progress_path) = fixture(3);
        let mut player = ScriptedPlayer::new();
        player.fail_on.push(ClipId(1));
        let mut session = session(&store_path, &progress_path, player);

        let played = session.play_once(Start::Resume).expect("play");
        assert!(!played.outcome.success);
        assert_eq!(session.tracker().get(), None);
    }

    #[test]
    fn loop_wraps_and_honours_count() {
        let (_dir, store_path, progress_path) = fixture(3);
        let mut session = session(&store_path, &progress_path, ScriptedPlayer::new());

        let summary = session.run_loop(Start::At(ClipId(2)), Some(4)).expect("loop");
        assert_eq!(summary.stop_reason, StopReason::CountReached);
        assert_eq!(
            session.player().played,
            vec![ClipId(2), ClipId(3), ClipId(1), ClipId(2)]
        );
        assert_eq!(ResumeTracker::open(&progress_path).get(), Some(ClipId(2)));
    }

    #[test]
    fn stop_signal_is_checked_between_clips() {
        let (_dir, store_path, progress_path) = fixture(3);
        let stop = StopSignal::new();
        let mut player = ScriptedPlayer::new();
        player.stop_after = Some((2, stop.clone()));
        let mut session = Session::new(
            store_path.clone(),
            ResumeTracker::open(&progress_path),
            player,
            stop,
        );

        let summary = session.run_loop(Start::Resume, None).expect("loop");
        assert_eq!(summary.stop_reason, StopReason::Requested);
        assert_eq!(summary.played.len(), 2);
        assert_eq!(session.tracker().get(), Some(ClipId(2)));
    }

    #[test]
    fn loop_stops_on_failed_playback() {
        let (_dir, store_path, progress_path) = fixture(3);
        let mut player = ScriptedPlayer::new();
        player.fail_on.push(ClipId(2));
        let mut session = session(&store_path, &progress_path, player);

        let summary = session.run_loop(Start::Resume, None).expect("loop");
        assert_eq!(summary.stop_reason, StopReason::PlaybackFailed);
        assert_eq!(summary.played.len(), 2);
        assert_eq!(session.tracker().get(), Some(ClipId(1)));
    }

    #[test]
    fn vanished_file_is_marked_missing_and_skipped() {
        let (dir, store_path, progress_path) = fixture(3);
        fs::remove_file(dir.path().join("2.mp4")).expect("remove");
        let mut session = session(&store_path, &progress_path, ScriptedPlayer::new());

        session.play_once(Start::Resume).expect("first");
        let second = session.play_once(Start::Resume).expect("second");
        assert_eq!(second.clip.id, ClipId(3));

        let store = ClipStore::load(&store_path).expect("load");
        assert_eq!(
            store.get(ClipId(2)).map(|clip| clip.status),
            Some(ClipStatus::Missing)
        );
    }

    #[test]
    fn unknown_start_clip_falls_back_to_first() {
        let (_dir, store_path, progress_path) = fixture(2);
        let mut session = session(&store_path, &progress_path, ScriptedPlayer::new());
        let played = session.play_once(Start::At(ClipId(99))).expect("play");
        assert_eq!(played.clip.id, ClipId(1));
    }

    #[test]
    fn corrupt_store_is_rebuilt_from_folders_and_marker_reset() {
        let (dir, store_path, progress_path) = fixture(3);
        ResumeTracker::open(&progress_path)
            .advance(ClipId(2))
            .expect("advance");
        fs::write(&store_path, b"{\"clips\": [truncated").expect("corrupt store");

        let mut session = session(&store_path, &progress_path, ScriptedPlayer::new())
            .with_rescan(vec![dir.path().to_path_buf()], vec![String::from("mp4")]);
        let played = session.play_once(Start::Resume).expect("play");

        assert_eq!(played.clip.id, ClipId(1));
        assert!(played.clip.file_path.ends_with("1.mp4"));
        assert_eq!(ClipStore::load(&store_path).expect("rebuilt").active_clips().len(), 3);
        assert!(dir.path().join("playlist.json.corrupt").exists());
    }

    #[test]
    fn corrupt_store_without_folders_is_empty() {
        let (_dir, store_path, progress_path) = fixture(2);
        fs::write(&store_path, b"garbage").expect("corrupt store");
        let mut session = session(&store_path, &progress_path, ScriptedPlayer::new());

        let err = session.play_once(Start::Resume).expect_err("empty");
        assert!(matches!(
            err.downcast_ref::<PlaylistError>(),
            Some(PlaylistError::EmptyPlaylist)
        ));
    }

    #[test]
    fn empty_playlist_is_an_error() {
        let (dir, store_path, progress_path) = fixture(1);
        fs::remove_file(dir.path().join("1.mp4")).expect("remove");
        let mut session = session(&store_path, &progress_path, ScriptedPlayer::new());

        let err = session.play_once(Start::Resume).expect_err("empty");
        assert!(matches!(
            err.downcast_ref::<PlaylistError>(),
            Some(PlaylistError::EmptyPlaylist)
        ));
        assert!(session.player().played.is_empty());
    }
}
