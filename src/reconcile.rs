use crate::config;
use crate::model::{Clip, ClipId, ClipStatus};
use crate::naming;
use crate::store::ClipStore;
use crate::tools::DurationProbe;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<ClipId>,
    pub marked_missing: Vec<ClipId>,
    pub restored: Vec<ClipId>,
    pub relinked: Vec<ClipId>,
    pub recovered_from_corrupt: bool,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.recovered_from_corrupt
            || !(self.added.is_empty()
                && self.marked_missing.is_empty()
                && self.restored.is_empty()
                && self.relinked.is_empty())
    }
}

pub fn scan(folders: &[PathBuf], extensions: &[String]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut discovered = Vec::new();

    for root in folders {
        if !root.is_dir() {
            warn!(folder = %root.display(), "video folder does not exist or is not a directory, skipping");
            continue;
        }

        let found = scan_folder(root, extensions);
        debug!(folder = %root.display(), files = found.len(), "scanned folder");
        for path in found {
            if seen.insert(config::path_key(&path)) {
                discovered.push(path);
            }
        }
    }

    discovered
}

fn scan_folder(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(folder = %root.display(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_video(entry.path(), extensions))
        .map(|entry| config::normalize_path(entry.path()))
        .collect();
    files.sort();

    let present: HashSet<PathBuf> = files.iter().cloned().collect();
    files.retain(|path| !has_processed_sibling(path, &present, extensions));
    files
}

fn has_processed_sibling(path: &Path, present: &HashSet<PathBuf>, extensions: &[String]) -> bool {
    let Some(stem) = path.file_stem().and_then(OsStr::to_str) else {
        return false;
    };
    if naming::is_processed_stem(stem) {
        return false;
    }
    extensions.iter().any(|ext| {
        let sibling = path.with_file_name(format!("{stem}{}.{ext}", naming::PROCESSED_SUFFIX));
        present.contains(&sibling)
    })
}

fn is_video(path: &Path, extensions: &[String]) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    extensions
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}

pub fn reconcile(discovered: &[PathBuf], store: &mut ClipStore) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let discovered_keys: HashSet<String> =
        discovered.iter().map(|path| config::path_key(path)).collect();
    let known: HashMap<String, ClipId> = store
        .clips()
        .map(|clip| (config::path_key(&clip.file_path), clip.id))
        .collect();
    // Raw downloads in the store, keyed by path without extension, that a newly
    // discovered `_processed` file may take over.
    let mut raw_records: HashMap<PathBuf, ClipId> = store
        .clips()
        .filter(|clip| !discovered_keys.contains(&config::path_key(&clip.file_path)))
        .filter(|clip| !is_processed_path(&clip.file_path))
        .map(|clip| (clip.file_path.with_extension(""), clip.id))
        .collect();

    for path in discovered {
        if let Some(id) = known.get(&config::path_key(path)) {
            let Some(clip) = store.get_mut(*id) else {
                continue;
            };
            if clip.status == ClipStatus::Missing && clip.file_path.exists() {
                clip.status = ClipStatus::Active;
                info!(id = %id, name = %clip.name, "clip file is back, restoring");
                report.restored.push(*id);
            }
            continue;
        }

        let superseded = raw_counterpart(path).and_then(|raw| raw_records.remove(&raw));
        if let Some(clip) = superseded.and_then(|id| store.get_mut(id)) {
            info!(id = %clip.id, path = %path.display(), "clip now points at its processed file");
            clip.file_path = path.clone();
            clip.status = ClipStatus::Active;
            report.relinked.push(clip.id);
            continue;
        }

        let id = store.allocate_id();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let parsed = naming::parse_file_name(&file_name);
        let mut clip = Clip::new(id, parsed.title, path.clone());
        clip.release_date = parsed.release_date;
        info!(id = %id, name = %clip.name, "adding clip");
        store.upsert(clip);
        report.added.push(id);
    }

    let processed_raws: HashSet<PathBuf> = discovered
        .iter()
        .filter_map(|path| raw_counterpart(path))
        .collect();
    let missing_now: Vec<(ClipId, bool)> = store
        .clips()
        .filter(|clip| clip.is_active())
        .filter_map(|clip| {
            if !clip.file_path.exists() {
                Some((clip.id, false))
            } else if !discovered_keys.contains(&config::path_key(&clip.file_path))
                && processed_raws.contains(&clip.file_path.with_extension(""))
            {
                Some((clip.id, true))
            } else {
                None
            }
        })
        .collect();
    for (id, superseded) in missing_now {
        if store.mark_missing(id) {
            if superseded {
                warn!(id = %id, "raw clip is replaced by a processed file already in the playlist, marking missing");
            } else {
                warn!(id = %id, "clip file is gone, marking missing");
            }
            report.marked_missing.push(id);
        }
    }

    report
}

fn is_processed_path(path: &Path) -> bool {
    path.file_stem()
        .and_then(OsStr::to_str)
        .is_some_and(naming::is_processed_stem)
}

// `dir/x_processed.mp4` -> `dir/x`
fn raw_counterpart(path: &Path) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let raw = stem.strip_suffix(naming::PROCESSED_SUFFIX)?;
    if raw.is_empty() {
        return None;
    }
    Some(path.with_file_name(raw))
}

pub fn fill_durations(store: &mut ClipStore, probe: &dyn DurationProbe) -> usize {
    let pending: Vec<(ClipId, PathBuf)> = store
        .clips()
        .filter(|clip| clip.is_active() && clip.duration_seconds.is_none())
        .map(|clip| (clip.id, clip.file_path.clone()))
        .collect();

    let mut filled = 0;
    for (id, path) in pending {
        match probe.duration_seconds(&path) {
            Ok(seconds) => {
                if let Some(clip) = store.get_mut(id) {
                    clip.duration_seconds = Some(seconds);
                    filled += 1;
                }
            }
            Err(err) => {
                warn!(id = %id, path = %path.display(), error = %err, "could not read clip duration");
            }
        }
    }
    filled
}

pub fn rebuild(
    store_path: &Path,
    folders: &[PathBuf],
    extensions: &[String],
    probe: Option<&dyn DurationProbe>,
) -> Result<(ClipStore, ReconcileReport)> {
    let (mut store, recovered) = ClipStore::load_or_set_aside(store_path)?;
    let discovered = scan(folders, extensions);
    let mut report = reconcile(&discovered, &mut store);
    report.recovered_from_corrupt = recovered;
    let probed = probe.map(|probe| fill_durations(&mut store, probe)).unwrap_or(0);

    if report.changed() || probed > 0 || !store_path.exists() {
        store.save(store_path)?;
    }

    info!(
        discovered = discovered.len(),
        added = report.added.len(),
        missing = report.marked_missing.len(),
        restored = report.restored.len(),
        relinked = report.relinked.len(),
        active = store.active_clips().len(),
        "playlist rebuilt"
    );
    Ok((store, report))
}
