pub mod avatar;
pub mod detect;
pub mod face;
pub mod geometry;
pub mod tencent;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, Sender};
use tokio::sync::oneshot;
use tracing::info;

use crate::error::{FaceError, FaceResult};
use face::{AvatarJob, FaceJob, FaceProcessor};

const FACE_QUEUE_CAPACITY: usize = 1_024;
const AVATAR_QUEUE_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Queues {
    pub face_tx: Sender<FaceJob>,
    pub avatar_tx: Sender<AvatarJob>,
}

pub struct QueueDepths {
    pub face: usize,
    pub avatar: usize,
}

#[derive(Default)]
pub struct QueueGauges {
    pub face: AtomicUsize,
    pub avatar: AtomicUsize,
}

impl QueueGauges {
    pub fn depths(&self) -> QueueDepths {
        QueueDepths {
            face: self.face.load(Ordering::Relaxed),
            avatar: self.avatar.load(Ordering::Relaxed),
        }
    }
}

/// Completion handle for a queued background job. Dropping it does not cancel
/// the job.
pub struct JobTicket<T> {
    rx: oneshot::Receiver<FaceResult<T>>,
}

impl<T> JobTicket<T> {
    pub async fn wait(self) -> FaceResult<T> {
        self.rx.await.unwrap_or(Err(FaceError::QueueClosed))
    }
}

/// Entry point for callers: synchronous operations run on the shared
/// `FaceProcessor`, uploads and QQ avatar downloads go through the queues.
#[derive(Clone)]
pub struct FacePipeline {
    processor: Arc<FaceProcessor>,
    queues: Queues,
    gauges: Arc<QueueGauges>,
}

impl FacePipeline {
    /// Spawns `face_threads` detection workers and one avatar worker. Must be
    /// called inside a tokio runtime.
    pub fn start(processor: FaceProcessor, face_threads: usize) -> Self {
        let processor = Arc::new(processor);
        let gauges = Arc::new(QueueGauges::default());
        let (face_tx, face_rx) = mpsc::channel::<FaceJob>(FACE_QUEUE_CAPACITY);
        let (avatar_tx, avatar_rx) = mpsc::channel::<AvatarJob>(AVATAR_QUEUE_CAPACITY);
        face::start_face_workers(face_threads, face_rx, processor.clone(), gauges.clone());
        face::start_avatar_worker(avatar_rx, processor.clone(), gauges.clone());
        info!(face_threads, "face pipeline workers started");
        Self { processor, queues: Queues { face_tx, avatar_tx }, gauges }
    }

    pub fn processor(&self) -> &Arc<FaceProcessor> { &self.processor }

    pub fn queues(&self) -> &Queues { &self.queues }

    pub fn gauges(&self) -> &Arc<QueueGauges> { &self.gauges }

    /// Stores the original, then queues detection. Returns once the original
    /// is on disk; the ticket resolves when detection finishes.
    pub async fn on_photo_uploaded(&self, event_id: i64, bytes: Vec<u8>) -> FaceResult<JobTicket<usize>> {
        let processor = self.processor.clone();
        tokio::task::spawn_blocking(move || processor.save_original(event_id, &bytes))
            .await
            .map_err(|_| FaceError::QueueClosed)??;
        log_upload(&self.processor, event_id);

        let (done, rx) = oneshot::channel();
        self.gauges.face.fetch_add(1, Ordering::Relaxed);
        if self.queues.face_tx.send(FaceJob { event_id, done: Some(done) }).await.is_err() {
            self.gauges.face.fetch_sub(1, Ordering::Relaxed);
            return Err(FaceError::QueueClosed);
        }
        Ok(JobTicket { rx })
    }

    pub async fn request_qq_avatar(&self, event_id: i64, face: String, qq_number: String) -> FaceResult<JobTicket<String>> {
        if !crate::utils::path::is_plain_filename(&face) {
            return Err(FaceError::InvalidFilename(face));
        }
        if !avatar::is_valid_qq_number(&qq_number) {
            return Err(FaceError::InvalidAccount(qq_number));
        }
        let (done, rx) = oneshot::channel();
        self.gauges.avatar.fetch_add(1, Ordering::Relaxed);
        let job = AvatarJob { event_id, face, qq_number, done: Some(done) };
        if self.queues.avatar_tx.send(job).await.is_err() {
            self.gauges.avatar.fetch_sub(1, Ordering::Relaxed);
            return Err(FaceError::QueueClosed);
        }
        Ok(JobTicket { rx })
    }
}

fn log_upload(processor: &FaceProcessor, event_id: i64) {
    let activity = processor.activity().clone();
    // Activity rows hit SQLite; keep that off the async workers.
    tokio::task::spawn_blocking(move || {
        activity.info("event", "picture uploaded", event_id, serde_json::json!({}));
    });
}
