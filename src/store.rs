use crate::config;
use crate::error::{PlaylistError, is_corrupt_store};
use crate::model::{Clip, ClipId, ClipStatus};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClipStore {
    clips: BTreeMap<ClipId, Clip>,
    next_id: u64,
}

#[derive(Serialize)]
struct StoreDocument<'a> {
    next_id: u64,
    clips: Vec<&'a Clip>,
}

impl ClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read metadata store {}", path.display()))?;
        let document: Value =
            serde_json::from_str(&raw).map_err(|source| PlaylistError::CorruptStore {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_document(document).map_err(|source| {
            PlaylistError::CorruptStore {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(err) if is_corrupt_store(&err) => {
                warn!(error = %err, "starting from an empty metadata store");
                Ok(Self::default())
            }
            other => other,
        }
    }

    // Returns `true` when the file was corrupt and has been moved aside.
    pub fn load_or_set_aside(path: &Path) -> Result<(Self, bool)> {
        match Self::load(path) {
            Err(err) if is_corrupt_store(&err) => {
                let kept = config::set_aside(path)?;
                warn!(error = %err, kept = %kept.display(), "metadata store is corrupt, starting over");
                Ok((Self::default(), true))
            }
            other => other.map(|store| (store, false)),
        }
    }

    fn from_document(document: Value) -> Result<Self, serde_json::Error> {
        let (records, persisted_next_id) = match document {
            Value::Array(records) => (records, 0),
            Value::Object(mut object) => {
                let next_id = object.get("next_id").and_then(Value::as_u64).unwrap_or(0);
                let records = match object.remove("clips").or_else(|| object.remove("playlist")) {
                    Some(Value::Array(records)) => records,
                    Some(_) => {
                        return Err(serde::de::Error::custom("`clips` must be an array"));
                    }
                    None => Vec::new(),
                };
                (records, next_id)
            }
            _ => {
                return Err(serde::de::Error::custom(
                    "expected an object with `clips` or an array of clips",
                ));
            }
        };

        let mut store = Self {
            clips: BTreeMap::new(),
            next_id: persisted_next_id,
        };
        for (index, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<Clip>(record) {
                Ok(clip) if clip.file_path.as_os_str().is_empty() => {
                    warn!(index, id = %clip.id, "dropping clip record with an empty file_path");
                }
                Ok(clip) => {
                    if store.clips.contains_key(&clip.id) {
                        warn!(index, id = %clip.id, "dropping clip record with a duplicate id");
                        continue;
                    }
                    store.upsert(clip);
                }
                Err(err) => {
                    warn!(index, error = %err, "dropping invalid clip record");
                }
            }
        }
        debug!(clips = store.len(), next_id = store.next_id, "metadata store loaded");
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let document = StoreDocument {
            next_id: self.next_id,
            clips: self.clips.values().collect(),
        };
        config::atomic_write_json(path, &document)
            .with_context(|| format!("failed to save metadata store {}", path.display()))
    }

    pub fn upsert(&mut self, clip: Clip) -> Option<Clip> {
        self.next_id = self.next_id.max(clip.id.0.saturating_add(1));
        self.clips.insert(clip.id, clip)
    }

    /// Hands out the next unused id. Ids are never recycled, even for removed records.
    pub fn allocate_id(&mut self) -> ClipId {
        let id = ClipId(self.next_id.max(1));
        self.next_id = id.0.saturating_add(1);
        id
    }

    pub fn get(&self, id: ClipId) -> Option<&Clip> {
        self.clips.get(&id)
    }

    pub fn get_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.clips.get_mut(&id)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<&Clip> {
        let key = config::path_key(path);
        self.clips
            .values()
            .find(|clip| config::path_key(&clip.file_path) == key)
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.clips.values()
    }

    pub fn active_clips(&self) -> Vec<&Clip> {
        self.clips.values().filter(|clip| clip.is_active()).collect()
    }

    pub fn mark_missing(&mut self, id: ClipId) -> bool {
        match self.clips.get_mut(&id) {
            Some(clip) if clip.status != ClipStatus::Missing => {
                clip.status = ClipStatus::Missing;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn total_duration_seconds(&self) -> f64 {
        self.clips
            .values()
            .filter(|clip| clip.is_active())
            .filter_map(|clip| clip.duration_seconds)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::calendar_date;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn sample_store() -> ClipStore {
        let mut store = ClipStore::new();
        let mut first = Clip::new(ClipId(1), "First", "/v/1_20130101_First.mp4");
        first.release_date = calendar_date(2013, 1, 1);
        first.duration_seconds = Some(120.0);
        store.upsert(first);
        let mut gone = Clip::new(ClipId(2), "Gone", "/v/gone.mp4");
        gone.status = ClipStatus::Missing;
        store.upsert(gone);
        store.upsert(Clip::new(ClipId(5), "Äänitys ☃", "/v/ääni.mp4"));
        store
    }

    #[test]
    fn save_load_save_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("playlist.json");
        let store = sample_store();

        store.save(&path).expect("save");
        let loaded = ClipStore::load(&path).expect("load");
        assert_eq!(loaded, store);

        loaded.save(&path).expect("save again");
        let reloaded = ClipStore::load(&path).expect("reload");
        assert_eq!(reloaded, store);
    }

    #[test]
    fn find_by_path_sees_missing_clips_too() {
        let store = sample_store();
        let found = store.find_by_path(Path::new("/v/gone.mp4")).map(|clip| clip.id);
        assert_eq!(found, Some(ClipId(2)));
        assert!(store.find_by_path(Path::new("/v/other.mp4")).is_none());
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempdir().expect("tempdir");
        let store = ClipStore::load(&dir.path().join("absent.json")).expect("load");
        assert!(store.is_empty());
    }

    #[test]
    fn malformed_json_is_corrupt_store() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("playlist.json");
        fs::write(&path, b"{\"clips\": [").expect("write");

        let err = ClipStore::load(&path).expect_err("corrupt");
        assert!(matches!(
            err.downcast_ref::<PlaylistError>(),
            Some(PlaylistError::CorruptStore { .. })
        ));

        let recovered = ClipStore::load_or_default(&path).expect("recover");
        assert!(recovered.is_empty());
    }

    #[test]
    fn wrong_top_level_shape_is_corrupt() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("playlist.json");
        fs::write(&path, b"42").expect("write");
        assert!(ClipStore::load(&path).is_err());
        assert!(ClipStore::load_or_default(&path).expect("recover").is_empty());
    }

    #[test]
    fn invalid_records_are_dropped_individually() {
        let document = serde_json::json!({
            "clips": [
                {"id": 1, "name": "ok", "file_path": "/v/a.mp4"},
                {"name": "no id", "file_path": "/v/b.mp4"},
                {"id": 3, "name": "no path"},
                {"id": "four", "file_path": "/v/d.mp4"},
                {"id": 1, "name": "duplicate", "file_path": "/v/e.mp4"},
                {"id": 6, "file_path": ""},
                {"id": 7, "file_path": "/v/g.mp4", "extra": {"nested": true}}
            ]
        });
        let store = ClipStore::from_document(document).expect("store");
        let ids: Vec<ClipId> = store.clips().map(|clip| clip.id).collect();
        assert_eq!(ids, vec![ClipId(1), ClipId(7)]);
        assert_eq!(store.get(ClipId(1)).map(|clip| clip.name.as_str()), Some("ok"));
    }

    #[test]
    fn reads_legacy_playlist_layout() {
        let document = serde_json::json!({
            "playlist": [
                {"videoNumber": 10, "name": "b", "file_path": "/v/b.mp4", "duration": 3.5},
                {"videoNumber": 4, "name": "a", "file_path": "/v/a.mp4"}
            ],
            "total_duration": "0h 0m 3s"
        });
        let store = ClipStore::from_document(document).expect("store");
        let ids: Vec<ClipId> = store.active_clips().iter().map(|clip| clip.id).collect();
        assert_eq!(ids, vec![ClipId(4), ClipId(10)]);
        assert_eq!(store.clone().allocate_id(), ClipId(11));
    }

    #[test]
    fn reads_bare_array() {
        let document = serde_json::json!([{"id": 2, "file_path": "/v/a.mp4"}]);
        let store = ClipStore::from_document(document).expect("store");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn persisted_next_id_is_never_lowered() {
        let document = serde_json::json!({"next_id": 40, "clips": [{"id": 3, "file_path": "a"}]});
        let mut store = ClipStore::from_document(document).expect("store");
        assert_eq!(store.allocate_id(), ClipId(40));
        assert_eq!(store.allocate_id(), ClipId(41));
    }

    #[test]
    fn upsert_keeps_position_and_allocation_starts_at_one() {
        let mut store = ClipStore::new();
        let a = store.allocate_id();
        let b = store.allocate_id();
        assert_eq!((a, b), (ClipId(1), ClipId(2)));
        store.upsert(Clip::new(a, "a", "a.mp4"));
        store.upsert(Clip::new(b, "b", "b.mp4"));

        let previous = store.upsert(Clip::new(a, "renamed", PathBuf::from("a2.mp4")));
        assert_eq!(previous.map(|clip| clip.name), Some(String::from("a")));
        let names: Vec<&str> = store.active_clips().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["renamed", "b"]);
    }

    #[test]
    fn mark_missing_excludes_from_active() {
        let mut store = sample_store();
        assert!(store.mark_missing(ClipId(1)));
        assert!(!store.mark_missing(ClipId(1)));
        assert!(!store.mark_missing(ClipId(99)));
        let ids: Vec<ClipId> = store.active_clips().iter().map(|clip| clip.id).collect();
        assert_eq!(ids, vec![ClipId(5)]);
        assert_eq!(store.len(), 3);
    }
}
