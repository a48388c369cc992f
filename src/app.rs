use crate::cli::{Cli, Command};
use crate::config::{self, Paths};
use crate::error::PlaylistError;
use crate::model::{ClipId, Settings, format_date};
use crate::naming;
use crate::player::CommandPlayer;
use crate::reconcile;
use crate::resume::ResumeTracker;
use crate::sequencer::{self, NextReason};
use crate::session::{LoopSummary, Played, Session, Start, StopReason, StopSignal};
use crate::store::ClipStore;
use crate::tools::{
    self, BatchReport, CommandAcquirer, DurationProbe, FfmpegNormalizer, FfprobeProbe,
    ItemOutcome,
};
use anyhow::{Result, bail};
use std::path::PathBuf;
use tracing::debug;

pub fn exit_code(result: &Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(err) => match err.downcast_ref::<PlaylistError>() {
            Some(playlist_err) if playlist_err.is_fatal() => 2,
            _ => 1,
        },
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let paths = Paths::resolve(cli.config_dir.as_deref())?;
    paths.ensure_dir()?;
    let settings = config::load_settings(&paths.settings())?;
    debug!(root = %paths.root.display(), folders = settings.folders.len(), "configuration loaded");

    match cli.command {
        Command::Rebuild {
            folders,
            save_folders,
            probe,
        } => rebuild(&paths, settings, folders, save_folders, probe),
        Command::Next => play(&paths, &settings, None),
        Command::Play { id } => play(&paths, &settings, Some(id)),
        Command::Run { from, count } => run_loop(&paths, &settings, from, count),
        Command::Status => status(&paths),
        Command::List { all } => list(&paths, all),
        Command::Reset => reset(&paths),
        Command::Normalize { folders } => normalize(&settings, folders),
        Command::Acquire { urls, file, dir } => acquire(&settings, urls, file, dir),
    }
}

fn rebuild(
    paths: &Paths,
    mut settings: Settings,
    folders: Vec<PathBuf>,
    save_folders: bool,
    probe: bool,
) -> Result<()> {
    if !folders.is_empty() {
        settings.folders = folders;
        if save_folders {
            config::save_settings(&paths.settings(), &settings)?;
            println!("Saved {} folder(s) to {}", settings.folders.len(), paths.settings().display());
        }
    }
    if settings.folders.is_empty() {
        bail!(
            "no video folders configured; pass --folder or add \"folders\" to {}",
            paths.settings().display()
        );
    }

    let ffprobe = FfprobeProbe {
        ffprobe: settings.ffprobe.clone(),
    };
    let probe: Option<&dyn DurationProbe> = if probe || settings.probe_durations {
        Some(&ffprobe)
    } else {
        None
    };

    let (store, report) = reconcile::rebuild(
        &paths.store(),
        &settings.folders,
        &settings.video_extensions,
        probe,
    )?;
    if report.recovered_from_corrupt {
        ResumeTracker::open(paths.progress()).reset()?;
        println!(
            "The old playlist was unreadable and was kept as {}.corrupt; resume position cleared.",
            paths.store().display()
        );
    }
    println!(
        "Playlist: {} active clip(s), {} new, {} missing, {} restored, {} now processed",
        store.active_clips().len(),
        report.added.len(),
        report.marked_missing.len(),
        report.restored.len(),
        report.relinked.len()
    );
    Ok(())
}

fn session(paths: &Paths, settings: &Settings) -> Session<CommandPlayer> {
    let session = Session::new(
        paths.store(),
        ResumeTracker::open(paths.progress()),
        CommandPlayer::new(settings.player.clone()),
        StopSignal::from_process_signals(),
    );
    if settings.folders.is_empty() {
        session
    } else {
        session.with_rescan(settings.folders.clone(), settings.video_extensions.clone())
    }
}

fn play(paths: &Paths, settings: &Settings, id: Option<ClipId>) -> Result<()> {
    let mut session = session(paths, settings);
    let played = match id {
        Some(id) => session.play_from(id)?,
        None => session.play_next()?,
    };
    print_played(&played);
    Ok(())
}

fn run_loop(
    paths: &Paths,
    settings: &Settings,
    from: Option<ClipId>,
    count: Option<usize>,
) -> Result<()> {
    let start = from.map(Start::At).unwrap_or(Start::Resume);
    let mut session = session(paths, settings);
    let summary = session.run_loop(start, count)?;
    for played in &summary.played {
        print_played(played);
    }
    println!("{}", loop_summary_line(&summary));
    Ok(())
}

fn print_played(played: &Played) {
    if played.outcome.success {
        println!("Played #{} {}", played.clip.id, played.clip.name);
    } else {
        let detail = played
            .outcome
            .failure_detail
            .as_deref()
            .unwrap_or("playback did not complete");
        println!(
            "Stopped #{} {} ({detail}). Progress not updated.",
            played.clip.id, played.clip.name
        );
    }
}

fn loop_summary_line(summary: &LoopSummary) -> String {
    let reason = match summary.stop_reason {
        StopReason::Requested => "stop requested",
        StopReason::CountReached => "clip count reached",
        StopReason::PlaybackFailed => "playback failed",
    };
    format!("Played {} clip(s); {reason}.", summary.played.len())
}

fn status(paths: &Paths) -> Result<()> {
    let store = ClipStore::load_or_default(&paths.store())?;
    let tracker = ResumeTracker::open(paths.progress());
    let active = store.active_clips();

    println!("Config dir: {}", paths.root.display());
    println!("Clips: {} active, {} total", active.len(), store.len());

    match tracker.get() {
        Some(id) => match store.get(id) {
            Some(clip) => println!("Last played: #{id} {} ({})", clip.name, clip.status.label()),
            None => println!("Last played: #{id} (no longer in the playlist)"),
        },
        None => println!("Last played: nothing yet"),
    }

    match sequencer::next_with_reason(&active, tracker.get()) {
        Ok(next) => {
            let note = match next.reason {
                NextReason::FirstRun => " (start of playlist)",
                NextReason::Following => "",
                NextReason::Wrapped => " (wrapped to start)",
                NextReason::StaleMarker => " (last played clip not found, restarting)",
            };
            println!("Up next: #{} {}{note}", next.clip.id, next.clip.name);
        }
        Err(_) => println!("Up next: nothing, the playlist is empty. Run `cliploop rebuild`."),
    }
    Ok(())
}

fn list(paths: &Paths, all: bool) -> Result<()> {
    let store = ClipStore::load_or_default(&paths.store())?;
    let clips: Vec<_> = store
        .clips()
        .filter(|clip| all || clip.is_active())
        .collect();

    if clips.is_empty() {
        println!("No clips. Run `cliploop rebuild --folder <DIR>`.");
        return Ok(());
    }

    println!("{:>6}  {:<8}  {:<10}  {:>8}  NAME", "ID", "STATUS", "RELEASED", "LENGTH");
    for clip in &clips {
        let released = clip.release_date.map(format_date).unwrap_or_default();
        let length = clip
            .duration_seconds
            .map(format_duration)
            .unwrap_or_default();
        println!(
            "{:>6}  {:<8}  {:<10}  {:>8}  {}",
            clip.id.to_string(),
            clip.status.label(),
            released,
            length,
            truncate(&clip.name, 60)
        );
    }

    let total = store.total_duration_seconds();
    if total > 0.0 {
        println!("{} clip(s), {} known runtime", clips.len(), format_duration(total));
    } else {
        println!("{} clip(s)", clips.len());
    }
    Ok(())
}

fn reset(paths: &Paths) -> Result<()> {
    let mut tracker = ResumeTracker::open(paths.progress());
    tracker.reset()?;
    println!("Resume position cleared; next playback starts at the first clip.");
    Ok(())
}

fn normalize(settings: &Settings, folders: Vec<PathBuf>) -> Result<()> {
    let folders = if folders.is_empty() {
        settings.folders.clone()
    } else {
        folders
    };
    if folders.is_empty() {
        bail!("no video folders configured; pass --folder");
    }

    let inputs: Vec<PathBuf> = reconcile::scan(&folders, &settings.video_extensions)
        .into_iter()
        .filter(|path| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| !naming::is_processed_stem(stem))
        })
        .collect();
    let normalizer = FfmpegNormalizer {
        ffmpeg: settings.ffmpeg.clone(),
        target_bitrate_kbps: settings.target_bitrate_kbps,
        keep_originals: settings.keep_originals,
    };
    let report = tools::normalize_batch(&normalizer, &inputs);
    print_batch("Normalized", &report);
    Ok(())
}

fn acquire(
    settings: &Settings,
    mut urls: Vec<String>,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
) -> Result<()> {
    if let Some(file) = file {
        urls.extend(tools::read_url_list(&file)?);
    }
    if urls.is_empty() {
        bail!("no URLs given; pass them as arguments or with --file");
    }

    let Some(dest) = dir
        .or_else(|| settings.download_dir.clone())
        .or_else(|| settings.folders.first().cloned())
    else {
        bail!("no download folder; pass --dir or set download_dir in config.json");
    };

    let acquirer = CommandAcquirer {
        template: settings.downloader.clone(),
    };
    let report = tools::acquire_batch(&acquirer, &urls, &dest)?;
    print_batch("Downloaded", &report);
    if report.done() > 0 {
        println!("Run `cliploop rebuild` to add the new clips to the playlist.");
    }
    Ok(())
}

fn print_batch(verb: &str, report: &BatchReport) {
    for item in &report.items {
        match &item.outcome {
            ItemOutcome::Done(_) => {}
            ItemOutcome::Skipped(reason) => println!("  skipped {}: {reason}", item.input),
            ItemOutcome::Failed(detail) => println!("  failed  {}: {detail}", item.input),
        }
    }
    println!(
        "{verb} {}, skipped {}, failed {}",
        report.done(),
        report.skipped(),
        report.failed()
    );
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
