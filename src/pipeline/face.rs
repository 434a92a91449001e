use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use image::DynamicImage;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::db::ActivityLog;
use crate::error::{FaceError, FaceResult};
use crate::models::{FaceRecord, ImageInfo, ProcessStatus, QqAvatarSidecar};
use crate::pipeline::avatar::{is_valid_qq_number, AvatarSource};
use crate::pipeline::detect::{encode_jpeg, FaceDetector, JPEG_QUALITY};
use crate::pipeline::geometry;
use crate::pipeline::QueueGauges;
use crate::store::AnnotationStore;
use crate::utils::path::{
    base_name, is_plain_filename, remove_if_exists, write_atomic, StoragePaths, AVATAR_EXTENSIONS,
    ORIGINAL_FILENAME,
};

/// Run detection for the event's stored original.
pub struct FaceJob {
    pub event_id: i64,
    pub done: Option<oneshot::Sender<FaceResult<usize>>>,
}

/// Download a QQ avatar for one face.
pub struct AvatarJob {
    pub event_id: i64,
    pub face: String,
    pub qq_number: String,
    pub done: Option<oneshot::Sender<FaceResult<String>>>,
}

/// A manually drawn box in original-image pixels. Values may be out of range
/// or inverted; they are clamped, not rejected.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ManualFace {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
    #[serde(default)]
    pub face_id: Option<String>,
}

/// Synchronous face operations over one storage root. Everything here blocks
/// on disk or network and is called from `spawn_blocking` or worker threads.
pub struct FaceProcessor {
    paths: StoragePaths,
    store: AnnotationStore,
    detector: FaceDetector,
    avatars: Arc<dyn AvatarSource>,
    activity: ActivityLog,
}

impl FaceProcessor {
    pub fn new(store: AnnotationStore, detector: FaceDetector, avatars: Arc<dyn AvatarSource>, activity: ActivityLog) -> Self {
        Self { paths: store.paths().clone(), store, detector, avatars, activity }
    }

    pub fn paths(&self) -> &StoragePaths { &self.paths }

    pub fn store(&self) -> &AnnotationStore { &self.store }

    pub fn activity(&self) -> &ActivityLog { &self.activity }

    /// Persists the uploaded bytes as the event's original picture.
    pub fn save_original(&self, event_id: i64, bytes: &[u8]) -> FaceResult<PathBuf> {
        self.paths.ensure_event_dirs(event_id)?;
        let dest = self.paths.original(event_id);
        write_atomic(&dest, bytes)?;
        info!(event_id, bytes = bytes.len(), "original picture stored");
        Ok(dest)
    }

    /// Detect, crop every face, then replace the annotation record. Any error
    /// leaves the previous record (or none) in place.
    pub fn process_event_image(&self, event_id: i64) -> FaceResult<usize> {
        let original = self.paths.original(event_id);
        let bytes = std::fs::read(&original).map_err(|e| FaceError::from_io(&original, e))?;
        let img = decode(&bytes)?;

        let record = self.detector.detect_image(&img, &bytes)?;
        self.paths.ensure_event_dirs(event_id)?;

        for face in &record.faces {
            let crop = geometry::crop_rect(&img, face.coordinates);
            let jpg = encode_jpeg(&crop, JPEG_QUALITY)?;
            write_atomic(&self.paths.face(event_id, &face.filename), &jpg)?;
            debug!(event_id, filename = %face.filename, "face artifact written");
        }

        // A concurrent delete of the event area may have removed the original.
        if !original.exists() {
            write_atomic(&original, &bytes)?;
        }

        self.store.replace(event_id, &record)?;
        Ok(record.faces.len())
    }

    /// `process_event_image` plus operator logging and activity rows.
    pub fn run_detection(&self, event_id: i64) -> FaceResult<usize> {
        match self.process_event_image(event_id) {
            Ok(count) => {
                info!(event_id, faces = count, "face detection completed");
                self.activity.info("image", "face detection completed", event_id, json!({ "faces_count": count }));
                Ok(count)
            }
            Err(e) => {
                error!(event_id, "face detection failed: {}", e);
                self.activity.error("image", "face detection failed", event_id, json!({ "error": e.to_string() }));
                Err(e)
            }
        }
    }

    pub fn add_manual_face(&self, event_id: i64, req: ManualFace) -> FaceResult<FaceRecord> {
        let face_id = match req.face_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => {
                if !is_plain_filename(id) || !is_plain_filename(&format!("{}.jpg", id)) {
                    return Err(FaceError::InvalidFilename(id.to_string()));
                }
                id.to_string()
            }
            None => format!("manual_{}", Utc::now().timestamp_millis()),
        };

        let original = self.paths.original(event_id);
        let bytes = std::fs::read(&original).map_err(|e| FaceError::from_io(&original, e))?;
        let img = decode(&bytes)?;
        let (width, height) = (img.width(), img.height());

        let coordinates = geometry::clamp_box(req.x1, req.y1, req.x2, req.y2, width, height);
        if coordinates.width() == 0 || coordinates.height() == 0 {
            return Err(FaceError::InvalidBox(format!(
                "({}, {}, {}, {}) is empty inside {}x{}",
                req.x1, req.y1, req.x2, req.y2, width, height
            )));
        }

        let crop = geometry::crop_rect(&img, coordinates);
        let jpg = encode_jpeg(&crop, JPEG_QUALITY)?;
        self.paths.ensure_event_dirs(event_id)?;
        let filename = format!("{}.jpg", face_id);
        write_atomic(&self.paths.face(event_id, &filename), &jpg)?;

        let face = FaceRecord {
            filename,
            coordinates,
            confidence: 1.0,
            manual: true,
            face_id: Some(face_id.clone()),
        };
        let info = ImageInfo { width, height, filename: ORIGINAL_FILENAME.to_string() };
        if let Err(e) = self.store.append_face(event_id, info, face.clone()) {
            warn!(event_id, face_id = %face_id, "face artifact saved but metadata not updated: {}", e);
        }

        info!(event_id, face_id = %face_id, "manual face added");
        self.activity.info(
            "image",
            "manual face added",
            event_id,
            json!({ "face_id": face_id, "coordinates": face.coordinates }),
        );
        Ok(face)
    }

    /// Removes the face artifact, then every avatar sharing its base name, the
    /// QQ sidecar and the record entry. A failure to remove the face artifact
    /// is returned before anything else is touched; the rest is best-effort.
    /// Repeating the call succeeds.
    pub fn delete_face(&self, event_id: i64, filename: &str) -> FaceResult<()> {
        if !is_plain_filename(filename) {
            return Err(FaceError::InvalidFilename(filename.to_string()));
        }
        let base = base_name(filename);

        let face = self.paths.face(event_id, filename);
        if let Err(e) = remove_if_exists(&face) {
            error!(event_id, "failed to remove face {:?}: {}", face, e);
            return Err(FaceError::from_io(&face, e));
        }

        for ext in AVATAR_EXTENSIONS {
            let path = self.paths.avatar(event_id, &format!("{}.{}", base, ext));
            if let Err(e) = remove_if_exists(&path) {
                warn!(event_id, "failed to remove avatar {:?}: {}", path, e);
            }
        }
        let sidecar = self.paths.avatar_sidecar(event_id, base);
        if let Err(e) = remove_if_exists(&sidecar) {
            warn!(event_id, "failed to remove avatar sidecar {:?}: {}", sidecar, e);
        }

        if let Err(e) = self.store.remove_face_by_filename(event_id, filename) {
            warn!(event_id, filename, "face removed but metadata not updated: {}", e);
        }

        info!(event_id, filename, "face deleted");
        self.activity.info("event", "face deleted", event_id, json!({ "deleted_face": filename }));
        Ok(())
    }

    /// Derived from artifact presence on every call. A corrupt record reads as
    /// absent.
    pub fn status(&self, event_id: i64) -> ProcessStatus {
        match self.store.load(event_id) {
            Ok(Some(record)) => return ProcessStatus::Completed { faces_count: record.faces.len() },
            Ok(None) => {}
            Err(e) => debug!(event_id, "status ignores unreadable record: {}", e),
        }
        if self.paths.original(event_id).is_file() {
            ProcessStatus::Processing
        } else {
            ProcessStatus::NotFound
        }
    }

    /// File names in the faces directory, sorted. A missing directory is empty.
    pub fn list_faces(&self, event_id: i64) -> FaceResult<Vec<String>> {
        let dir = self.paths.faces_dir(event_id);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FaceError::Io(e)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn read_original(&self, event_id: i64) -> FaceResult<Vec<u8>> {
        let path = self.paths.original(event_id);
        std::fs::read(&path).map_err(|e| FaceError::from_io(&path, e))
    }

    pub fn read_face(&self, event_id: i64, filename: &str) -> FaceResult<Vec<u8>> {
        if !is_plain_filename(filename) {
            return Err(FaceError::InvalidFilename(filename.to_string()));
        }
        let path = self.paths.face(event_id, filename);
        std::fs::read(&path).map_err(|e| FaceError::from_io(&path, e))
    }

    pub fn read_avatar(&self, event_id: i64, filename: &str) -> FaceResult<Vec<u8>> {
        if !is_plain_filename(filename) {
            return Err(FaceError::InvalidFilename(filename.to_string()));
        }
        let path = self.paths.avatar(event_id, filename);
        std::fs::read(&path).map_err(|e| FaceError::from_io(&path, e))
    }

    /// Stores an uploaded avatar as `{base}.{ext}` and drops avatars of the
    /// same face under other extensions. Returns the stored file name.
    pub fn upload_avatar(&self, event_id: i64, face: &str, ext: &str, bytes: &[u8]) -> FaceResult<String> {
        if !is_plain_filename(face) {
            return Err(FaceError::InvalidFilename(face.to_string()));
        }
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if !AVATAR_EXTENSIONS.contains(&ext.as_str()) {
            return Err(FaceError::InvalidFilename(format!("{} (only jpg, jpeg, png allowed)", face)));
        }
        let base = base_name(face);
        let filename = format!("{}.{}", base, ext);
        self.paths.ensure_event_dirs(event_id)?;
        write_atomic(&self.paths.avatar(event_id, &filename), bytes)?;
        self.remove_other_avatars(event_id, base, &ext);
        info!(event_id, filename = %filename, "avatar uploaded");
        self.activity.info("image", "avatar uploaded", event_id, json!({ "filename": filename }));
        Ok(filename)
    }

    /// Fetches the QQ avatar into `{base}.jpg`, then writes the sidecar.
    pub fn download_qq_avatar(&self, event_id: i64, face: &str, qq_number: &str) -> FaceResult<String> {
        if !is_plain_filename(face) {
            return Err(FaceError::InvalidFilename(face.to_string()));
        }
        if !is_valid_qq_number(qq_number) {
            return Err(FaceError::InvalidAccount(qq_number.to_string()));
        }
        let bytes = self.avatars.fetch_avatar(qq_number)?;
        let base = base_name(face);
        let filename = format!("{}.jpg", base);
        self.paths.ensure_event_dirs(event_id)?;
        write_atomic(&self.paths.avatar(event_id, &filename), &bytes)?;
        self.remove_other_avatars(event_id, base, "jpg");

        let sidecar = QqAvatarSidecar { qq_number: qq_number.to_string(), filename: filename.clone() };
        let data = serde_json::to_vec(&sidecar).map_err(|e| FaceError::Encode(e.to_string()))?;
        write_atomic(&self.paths.avatar_sidecar(event_id, base), &data)?;

        info!(event_id, filename = %filename, "QQ avatar downloaded");
        self.activity.info("image", "QQ avatar downloaded", event_id, json!({ "face": face, "qq_number": qq_number }));
        Ok(filename)
    }

    /// Sidecar for the face's base name, if any.
    pub fn face_qq_info(&self, event_id: i64, filename: &str) -> FaceResult<Option<QqAvatarSidecar>> {
        if !is_plain_filename(filename) {
            return Err(FaceError::InvalidFilename(filename.to_string()));
        }
        let path = self.paths.avatar_sidecar(event_id, base_name(filename));
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FaceError::Io(e)),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| FaceError::MetadataCorrupt { path, reason: e.to_string() })
    }

    pub fn qq_nickname(&self, qq_number: &str) -> FaceResult<String> {
        if !is_valid_qq_number(qq_number) {
            return Err(FaceError::InvalidAccount(qq_number.to_string()));
        }
        self.avatars.nickname(qq_number)
    }

    fn remove_other_avatars(&self, event_id: i64, base: &str, keep_ext: &str) {
        for ext in AVATAR_EXTENSIONS.iter().filter(|e| **e != keep_ext) {
            let path = self.paths.avatar(event_id, &format!("{}.{}", base, ext));
            if let Err(e) = remove_if_exists(&path) {
                warn!(event_id, "failed to remove stale avatar {:?}: {}", path, e);
            }
        }
    }
}

fn decode(bytes: &[u8]) -> FaceResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| FaceError::ImageDecodeFailed(e.to_string()))
}

pub fn start_face_workers(
    n: usize,
    mut rx: mpsc::Receiver<FaceJob>,
    processor: Arc<FaceProcessor>,
    gauges: Arc<QueueGauges>,
) {
    // Distribute jobs to workers using round-robin
    let n = n.max(1);
    let mut worker_txs = Vec::new();
    let mut worker_rxs = Vec::new();
    for _ in 0..n {
        let (wt, wr) = mpsc::channel::<FaceJob>(64);
        worker_txs.push(wt);
        worker_rxs.push(wr);
    }

    tokio::spawn(async move {
        let mut idx = 0;
        while let Some(job) = rx.recv().await {
            let target_idx = idx % worker_txs.len();
            if worker_txs[target_idx].send(job).await.is_err() {
                break;
            }
            idx += 1;
        }
    });

    for mut worker_rx in worker_rxs.into_iter() {
        let processor_c = processor.clone();
        let gauges_c = gauges.clone();
        tokio::spawn(async move {
            while let Some(job) = worker_rx.recv().await {
                gauges_c.face.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
                let processor = processor_c.clone();
                let event_id = job.event_id;
                let result = match tokio::task::spawn_blocking(move || processor.run_detection(event_id)).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Face processing task panicked for event {}: {}", event_id, e);
                        Err(FaceError::QueueClosed)
                    }
                };
                if let Some(done) = job.done {
                    let _ = done.send(result);
                }
            }
        });
    }
}

pub fn start_avatar_worker(mut rx: mpsc::Receiver<AvatarJob>, processor: Arc<FaceProcessor>, gauges: Arc<QueueGauges>) {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            gauges.avatar.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
            let processor = processor.clone();
            let AvatarJob { event_id, face, qq_number, done } = job;
            let result = match tokio::task::spawn_blocking(move || {
                processor.download_qq_avatar(event_id, &face, &qq_number)
            })
            .await
            {
                Ok(result) => result,
                Err(e) => {
                    error!("Avatar download task panicked for event {}: {}", event_id, e);
                    Err(FaceError::QueueClosed)
                }
            };
            if let Err(e) = &result {
                warn!(event_id, "QQ avatar download failed: {}", e);
            }
            if let Some(done) = done {
                let _ = done.send(result);
            }
        }
    });
}
