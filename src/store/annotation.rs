use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FaceError, FaceResult};
use crate::models::{AnnotationRecord, FaceRecord, ImageInfo};
use crate::store::locks::EventLocks;
use crate::utils::path::{write_atomic, StoragePaths};

/// Owner of the per-event `metadata.json` record.
///
/// Every operation is a whole-record read / mutate / write cycle under the
/// event's lock. Writes go to a temporary file in the same directory and are
/// renamed into place, so readers see either the old or the new record.
/// Nothing is cached between calls.
#[derive(Clone)]
pub struct AnnotationStore {
    paths: StoragePaths,
    locks: EventLocks,
}

impl AnnotationStore {
    pub fn new(paths: StoragePaths, locks: EventLocks) -> Self {
        Self { paths, locks }
    }

    pub fn paths(&self) -> &StoragePaths { &self.paths }

    /// `Ok(None)` when no record exists; `MetadataCorrupt` when it cannot be parsed.
    pub fn load(&self, event_id: i64) -> FaceResult<Option<AnnotationRecord>> {
        read_record(&self.paths.metadata(event_id))
    }

    /// Overwrites the record (fresh detection run). Also replaces a corrupt file.
    pub fn replace(&self, event_id: i64, record: &AnnotationRecord) -> FaceResult<()> {
        let lock = self.locks.for_event(event_id);
        let _guard = lock.lock();
        write_record(&self.paths.metadata(event_id), record)?;
        debug!(event_id, faces = record.faces.len(), "annotation record replaced");
        Ok(())
    }

    /// Appends `face`, creating the record seeded with `image_info` if absent.
    /// An existing record keeps its own `image_info`.
    pub fn append_face(&self, event_id: i64, image_info: ImageInfo, face: FaceRecord) -> FaceResult<AnnotationRecord> {
        let lock = self.locks.for_event(event_id);
        let _guard = lock.lock();
        let path = self.paths.metadata(event_id);
        let mut record = read_record(&path)?.unwrap_or_else(|| AnnotationRecord::empty(image_info));
        record.faces.push(face);
        write_record(&path, &record)?;
        Ok(record)
    }

    /// Drops every face named `filename`. Returns whether anything was removed;
    /// a missing record or unknown filename is not an error.
    pub fn remove_face_by_filename(&self, event_id: i64, filename: &str) -> FaceResult<bool> {
        let lock = self.locks.for_event(event_id);
        let _guard = lock.lock();
        let path = self.paths.metadata(event_id);
        let Some(mut record) = read_record(&path)? else {
            return Ok(false);
        };
        let before = record.faces.len();
        record.faces.retain(|f| f.filename != filename);
        if record.faces.len() == before {
            return Ok(false);
        }
        write_record(&path, &record)?;
        Ok(true)
    }
}

fn read_record(path: &Path) -> FaceResult<Option<AnnotationRecord>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(FaceError::Io(e)),
    };
    serde_json::from_slice(&data).map(Some).map_err(|e| {
        warn!("Unparseable annotation record {:?}: {}", path, e);
        FaceError::MetadataCorrupt { path: path.to_path_buf(), reason: e.to_string() }
    })
}

fn write_record(path: &Path, record: &AnnotationRecord) -> FaceResult<()> {
    // Four-space indentation matches records already on disk.
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    record
        .serialize(&mut ser)
        .map_err(|e| FaceError::Encode(e.to_string()))?;
    write_atomic(path, &buf)?;
    Ok(())
}
