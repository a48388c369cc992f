use crate::model::{UNTITLED, calendar_date};
use time::Date;
use unicode_normalization::UnicodeNormalization;

pub const PROCESSED_SUFFIX: &str = "_processed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub title: String,
    pub release_date: Option<Date>,
}

pub fn parse_file_name(raw: &str) -> ParsedName {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let stem = strip_processed(strip_extension(base));

    let mut parts = stem.splitn(3, '_');
    let (first, second, rest) = (parts.next(), parts.next(), parts.next());
    if let (Some(timestamp), Some(date), Some(title)) = (first, second, rest) {
        if is_digits(timestamp) {
            if let Some(release_date) = parse_compact_date(date) {
                return ParsedName {
                    title: clean_title(title.trim_end_matches('_')),
                    release_date: Some(release_date),
                };
            }
        }
    }

    ParsedName {
        title: clean_title(&stem.replace('_', " ")),
        release_date: None,
    }
}

pub fn is_processed_stem(stem: &str) -> bool {
    stem.ends_with(PROCESSED_SUFFIX)
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 && name[idx + 1..].chars().all(|ch| ch.is_ascii_alphanumeric()) => {
            &name[..idx]
        }
        _ => name,
    }
}

fn strip_processed(stem: &str) -> &str {
    stem.strip_suffix(PROCESSED_SUFFIX).unwrap_or(stem)
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn parse_compact_date(value: &str) -> Option<Date> {
    if value.len() != 8 || !is_digits(value) {
        return None;
    }
    let year = value[0..4].parse::<i32>().ok()?;
    let month = value[4..6].parse::<u8>().ok()?;
    let day = value[6..8].parse::<u8>().ok()?;
    calendar_date(year, month, day)
}

fn clean_title(raw: &str) -> String {
    let visible: String = raw.chars().filter(|ch| !ch.is_control()).collect();
    let normalized: String = visible.nfc().collect();
    let collapsed = collapse_whitespace(&normalized);
    if collapsed.is_empty() {
        String::from(UNTITLED)
    } else {
        collapsed
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
