use std::io::Write;
use std::path::{Path, PathBuf};

/// Avatar image extensions accepted for upload and swept on face deletion.
pub const AVATAR_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub const ORIGINAL_FILENAME: &str = "original.jpg";
pub const METADATA_FILENAME: &str = "metadata.json";

/// Fixed layout of the per-event storage areas:
///
/// ```text
/// {root}/events/{id}/original.jpg
/// {root}/events/{id}/metadata.json
/// {root}/events/{id}/faces/{face file}
/// {root}/events/{id}/avatars/{base}.{jpg,jpeg,png,json}
/// ```
#[derive(Clone, Debug)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn event_dir(&self, event_id: i64) -> PathBuf {
        self.root.join("events").join(event_id.to_string())
    }

    pub fn original(&self, event_id: i64) -> PathBuf {
        self.event_dir(event_id).join(ORIGINAL_FILENAME)
    }

    pub fn metadata(&self, event_id: i64) -> PathBuf {
        self.event_dir(event_id).join(METADATA_FILENAME)
    }

    pub fn faces_dir(&self, event_id: i64) -> PathBuf {
        self.event_dir(event_id).join("faces")
    }

    pub fn face(&self, event_id: i64, filename: &str) -> PathBuf {
        self.faces_dir(event_id).join(filename)
    }

    pub fn avatars_dir(&self, event_id: i64) -> PathBuf {
        self.event_dir(event_id).join("avatars")
    }

    pub fn avatar(&self, event_id: i64, filename: &str) -> PathBuf {
        self.avatars_dir(event_id).join(filename)
    }

    pub fn avatar_sidecar(&self, event_id: i64, base: &str) -> PathBuf {
        self.avatar(event_id, &format!("{}.json", base))
    }

    pub fn ensure_event_dirs(&self, event_id: i64) -> std::io::Result<()> {
        for dir in [self.event_dir(event_id), self.faces_dir(event_id), self.avatars_dir(event_id)] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Writes `bytes` to a temp file beside `path`, then renames it into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Removes `path`, treating an already-missing file as success.
pub fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// True when `name` is a single, non-empty path component (no traversal).
pub fn is_plain_filename(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
        && !name.contains('\\')
}

/// File name without its final extension: `face_1.jpg` -> `face_1`.
pub fn base_name(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    }
}

/// Lower-cased extension without the dot, if any.
pub fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
