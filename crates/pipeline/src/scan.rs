use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use core_types::{media_kind_for_extension, MediaKind};
use tracing::debug;
use walkdir::WalkDir;

/// One file found on disk that the catalog knows how to ingest.
#[derive(Debug, Clone)]
pub struct AssetPath {
    pub path: PathBuf,
    pub extension: String,
    pub media_kind: MediaKind,
    pub size: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Walks the given files and directories and returns every supported media
/// file exactly once, in a stable walk order. Inputs that do not exist are
/// skipped silently; a file input is subject to the same extension filter
/// as files found inside directories.
pub fn scan(inputs: &[PathBuf]) -> Vec<AssetPath> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut out = Vec::new();

    for input in inputs {
        if !input.exists() {
            debug!(path = %input.display(), "skipping missing scan input");
            continue;
        }

        let walk = WalkDir::new(input)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

        for entry in walk.filter_map(|res| res.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            let Some(candidate) = classify(&path) else {
                continue;
            };
            if seen.insert(path) {
                out.push(candidate);
            }
        }
    }

    out
}

fn classify(path: &Path) -> Option<AssetPath> {
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(|e| e.to_ascii_lowercase())?;
    let media_kind = media_kind_for_extension(&extension)?;

    // Attribute reads are best effort: a file that vanishes mid-scan still
    // produces a candidate and the importer records what it saw.
    let meta = fs::metadata(path).ok();
    let size = meta.as_ref().map(|m| m.len() as i64).unwrap_or(0);
    let created_at = meta
        .as_ref()
        .and_then(|m| m.created().ok())
        .map(DateTime::<Utc>::from);
    let modified_at = meta
        .as_ref()
        .and_then(|m| m.modified().ok())
        .map(DateTime::<Utc>::from);

    Some(AssetPath {
        path: path.to_path_buf(),
        extension,
        media_kind,
        size,
        created_at,
        modified_at,
    })
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn keeps_supported_extensions_and_drops_the_rest() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("photo1.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join("photo2.CR2"), b"raw").unwrap();
        fs::write(dir.path().join("clip.mov"), b"mov").unwrap();
        fs::write(dir.path().join("notes.txt"), b"text").unwrap();

        let found = scan(&[dir.path().to_path_buf()]);
        assert_eq!(found.len(), 3);

        let names: Vec<&str> = found
            .iter()
            .map(|c| c.path.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["clip.mov", "photo1.jpg", "photo2.CR2"]);

        let raw = found.iter().find(|c| c.extension == "cr2").unwrap();
        assert_eq!(raw.media_kind, MediaKind::Image);
        assert_eq!(raw.size, 3);
        let video = found.iter().find(|c| c.extension == "mov").unwrap();
        assert_eq!(video.media_kind, MediaKind::Video);
    }

    #[test]
    fn recurses_but_skips_hidden_entries() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("shoot").join("day2");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("deep.nef"), b"raw").unwrap();

        let hidden_dir = dir.path().join(".cache");
        fs::create_dir_all(&hidden_dir).unwrap();
        fs::write(hidden_dir.join("stash.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join(".DS_Store.jpg"), b"jpg").unwrap();

        let found = scan(&[dir.path().to_path_buf()]);
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("shoot/day2/deep.nef"));
    }

    #[test]
    fn deduplicates_across_overlapping_inputs() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("one.jpg");
        fs::write(&file, b"jpg").unwrap();

        let found = scan(&[dir.path().to_path_buf(), file.clone(), dir.path().to_path_buf()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, file);
    }

    #[test]
    fn missing_inputs_are_ignored() {
        let dir = tempdir().unwrap();
        let ghost = dir.path().join("not-here");
        assert!(scan(&[ghost]).is_empty());
    }

    #[test]
    fn direct_file_input_still_passes_the_filter() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("readme.txt");
        fs::write(&doc, b"text").unwrap();
        assert!(scan(&[doc]).is_empty());
    }
}
