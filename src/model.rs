use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::{Date, Month};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(pub u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClipId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClipStatus {
    #[default]
    Active,
    Missing,
}

impl ClipStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Missing => "missing",
        }
    }
}

impl Serialize for ClipStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ClipStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        match value.as_deref().map(str::trim) {
            Some(raw) if raw.eq_ignore_ascii_case("missing") => Ok(Self::Missing),
            _ => Ok(Self::Active),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    #[serde(alias = "videoNumber")]
    pub id: ClipId,
    #[serde(default = "default_clip_name", deserialize_with = "lenient_name")]
    pub name: String,
    #[serde(
        default,
        serialize_with = "serialize_release_date",
        deserialize_with = "lenient_release_date"
    )]
    pub release_date: Option<Date>,
    pub file_path: PathBuf,
    #[serde(default)]
    pub status: ClipStatus,
    #[serde(
        default,
        alias = "duration",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_duration"
    )]
    pub duration_seconds: Option<f64>,
}

impl Clip {
    pub fn new(id: ClipId, name: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            release_date: None,
            file_path: file_path.into(),
            status: ClipStatus::Active,
            duration_seconds: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ClipStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaylistState {
    #[serde(default, alias = "last_played_videoNumber")]
    pub last_played_id: Option<ClipId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub folders: Vec<PathBuf>,
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    #[serde(default = "default_player")]
    pub player: Vec<String>,
    #[serde(default = "default_target_bitrate_kbps")]
    pub target_bitrate_kbps: u32,
    #[serde(default = "default_keep_originals")]
    pub keep_originals: bool,
    #[serde(default = "default_downloader")]
    pub downloader: Vec<String>,
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub probe_durations: bool,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

fn default_video_extensions() -> Vec<String> {
    ["mp4", "mkv", "webm", "mov", "m4v"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_player() -> Vec<String> {
    vec![
        String::from("mpv"),
        String::from("--really-quiet"),
        String::from("{path}"),
    ]
}

fn default_target_bitrate_kbps() -> u32 {
    2300
}

fn default_keep_originals() -> bool {
    true
}

fn default_downloader() -> Vec<String> {
    vec![
        String::from("yt-dlp"),
        String::from("--restrict-filenames"),
        String::from("-o"),
        String::from("%(timestamp)s_%(upload_date)s_%(title)s.%(ext)s"),
        String::from("{url}"),
    ]
}

fn default_ffmpeg() -> String {
    String::from("ffmpeg")
}

fn default_ffprobe() -> String {
    String::from("ffprobe")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            video_extensions: default_video_extensions(),
            player: default_player(),
            target_bitrate_kbps: default_target_bitrate_kbps(),
            keep_originals: default_keep_originals(),
            downloader: default_downloader(),
            download_dir: None,
            probe_durations: false,
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

pub const UNTITLED: &str = "Untitled";

fn default_clip_name() -> String {
    String::from(UNTITLED)
}

fn lenient_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(default_clip_name))
}

fn lenient_duration<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|raw| raw.as_f64())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0))
}

fn serialize_release_date<S>(value: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(date) => serializer.serialize_str(&format_date(*date)),
        None => serializer.serialize_none(),
    }
}

fn lenient_release_date<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|raw| raw.as_str().and_then(parse_iso_date)))
}

pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub fn parse_iso_date(raw: &str) -> Option<Date> {
    let day_part = raw.trim().split('T').next()?;
    let mut parts = day_part.split('-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u8>().ok()?;
    let day = parts.next()?.parse::<u8>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    calendar_date(year, month, day)
}

pub(crate) fn calendar_date(year: i32, month: u8, day: u8) -> Option<Date> {
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}
