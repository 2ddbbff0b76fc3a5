//! Remote destination path builder.
//!
//! Pure functions: identical input always yields identical output, which the
//! upload loop and its tests rely on.

use crate::model::UploadItem;
use crate::settings::{FilenameStrategy, FolderStrategy};
use chrono::{DateTime, Utc};

/// Sanitize a source filename for use as a single remote path segment.
///
/// Path separators become `_`, control characters are stripped, whitespace
/// runs collapse to one space, and names made only of dots are replaced.
pub fn sanitize_filename(value: &str) -> String {
    let replaced: String = value
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .filter(|c| !matches!(*c as u32, 0x00..=0x1F | 0x7F))
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");

    if !collapsed.is_empty() && collapsed.chars().all(|c| c == '.') {
        "upload".to_string()
    } else {
        collapsed
    }
}

pub fn apply_filename_strategy(
    filename: &str,
    creation_time: i64,
    strategy: FilenameStrategy,
) -> String {
    let safe = sanitize_filename(filename);
    match strategy {
        FilenameStrategy::Original if safe.is_empty() => format!("upload_{creation_time}.bin"),
        FilenameStrategy::Original => safe,
        FilenameStrategy::TimestampPrefix if safe.is_empty() => {
            format!("{creation_time}_upload.bin")
        }
        FilenameStrategy::TimestampPrefix => format!("{creation_time}_{safe}"),
    }
}

/// Normalize a configured base directory.
///
/// Backslashes become slashes, repeated slashes collapse, the trailing slash
/// is stripped and a leading slash enforced. An empty result (including a
/// bare `/`) falls back to `default_base`.
pub fn normalize_base_path(base_path: &str, default_base: &str) -> String {
    let mut normalized = String::with_capacity(base_path.len() + 1);
    for c in base_path.trim().chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' && normalized.ends_with('/') {
            continue;
        }
        normalized.push(c);
    }
    if normalized.ends_with('/') {
        normalized.pop();
    }

    if normalized.is_empty() {
        default_base.to_string()
    } else if normalized.starts_with('/') {
        normalized
    } else {
        format!("/{normalized}")
    }
}

/// Normalize a directory requested for listing. Empty or `.` means root.
pub fn normalize_listing_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "." {
        return "/".to_string();
    }
    normalize_base_path(trimmed, "/")
}

/// `YYYY-MM` of a millisecond timestamp, in UTC.
pub fn month_folder(creation_time: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(creation_time)
        .unwrap_or_default()
        .format("%Y-%m")
        .to_string()
}

/// Build the full remote path for `item`.
pub fn build_remote_path(
    base_path: &str,
    default_base: &str,
    item: &UploadItem,
    folder_strategy: FolderStrategy,
    filename_strategy: FilenameStrategy,
) -> String {
    let base = normalize_base_path(base_path, default_base);
    let filename = apply_filename_strategy(&item.filename, item.creation_time, filename_strategy);

    match folder_strategy {
        FolderStrategy::Flat => join(&base, &filename),
        FolderStrategy::ByMonth => {
            join(&join(&base, &month_folder(item.creation_time)), &filename)
        }
    }
}

/// Join a normalized directory and a child name.
pub fn join(base: &str, child: &str) -> String {
    if base == "/" {
        format!("/{child}")
    } else {
        format!("{base}/{child}")
    }
}
