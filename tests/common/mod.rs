#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use faceswap_backend::db::{self, ActivityLog, DbPool};
use faceswap_backend::error::{FaceError, FaceResult};
use faceswap_backend::pipeline::avatar::AvatarSource;
use faceswap_backend::pipeline::detect::{DetectorLimits, FaceDetector, FaceProvider, ProviderFace, ProviderRequest, ProviderResponse};
use faceswap_backend::pipeline::face::FaceProcessor;
use faceswap_backend::pipeline::geometry::RawBox;
use faceswap_backend::pipeline::FacePipeline;
use faceswap_backend::store::{AnnotationStore, EventLocks};
use faceswap_backend::utils::path::StoragePaths;
use faceswap_backend::{AppPaths, AppState};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Provider double: fixed boxes, records the dimensions it was sent.
pub struct MockProvider {
    boxes: Vec<RawBox>,
    pub calls: AtomicUsize,
    pub submitted: Mutex<Vec<(u32, u32, usize)>>,
}

impl MockProvider {
    pub fn new(boxes: Vec<RawBox>) -> Self {
        Self { boxes, calls: AtomicUsize::new(0), submitted: Mutex::new(Vec::new()) }
    }
}

impl FaceProvider for MockProvider {
    fn submit(&self, request: &ProviderRequest<'_>) -> FaceResult<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (w, h) = image::io::Reader::new(Cursor::new(request.image))
            .with_guessed_format()
            .map_err(|e| FaceError::ImageDecodeFailed(e.to_string()))?
            .into_dimensions()
            .map_err(|e| FaceError::ImageDecodeFailed(e.to_string()))?;
        self.submitted.lock().push((w, h, request.image.len()));
        Ok(ProviderResponse {
            faces: self.boxes.iter().map(|b| ProviderFace { bbox: *b, confidence: Some(0.99) }).collect(),
            image_width: w,
            image_height: h,
        })
    }
}

/// Provider double that always times out.
pub struct DownProvider;

impl FaceProvider for DownProvider {
    fn submit(&self, _request: &ProviderRequest<'_>) -> FaceResult<ProviderResponse> {
        Err(FaceError::ProviderUnavailable("operation timed out".into()))
    }
}

pub struct StubAvatars;

impl AvatarSource for StubAvatars {
    fn nickname(&self, qq_number: &str) -> FaceResult<String> {
        if qq_number == "10001" {
            Ok("Pony".to_string())
        } else {
            Err(FaceError::ProviderUnavailable("lookup failed".into()))
        }
    }

    fn fetch_avatar(&self, _qq_number: &str) -> FaceResult<Vec<u8>> {
        Ok(jpeg_bytes(16, 16))
    }
}

pub struct TestEnv {
    pub tmp: TempDir,
    pub pool: DbPool,
    pub paths: StoragePaths,
    pub pipeline: FacePipeline,
    pub state: Arc<AppState>,
}

/// Storage root, database and a running pipeline. Must run inside a tokio runtime.
pub fn setup(provider: Arc<dyn FaceProvider>) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let storage = tmp.path().join("storage");
    let db_path = tmp.path().join("db").join("app.db");
    let pool = db::create_pool(&db_path, 4).unwrap();

    let paths = StoragePaths::new(&storage);
    let store = AnnotationStore::new(paths.clone(), EventLocks::new());
    let detector = FaceDetector::new(provider, DetectorLimits::default());
    let processor = FaceProcessor::new(store, detector, Arc::new(StubAvatars), ActivityLog::new(pool.clone()));
    let pipeline = FacePipeline::start(processor, 2);

    let state = Arc::new(AppState::new(AppPaths { storage, db_path }, pool.clone(), pipeline.clone()));
    TestEnv { tmp, pool, paths, pipeline, state }
}

pub fn seed_event(pool: &DbPool, is_open: bool) -> i64 {
    let conn = pool.get().unwrap();
    db::writer::insert_event(&conn, "Annual dinner", "token", "2026-10-01", is_open).unwrap()
}

pub fn solid(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 150, 120])))
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    solid(width, height).write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Jpeg(90)).unwrap();
    buf
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    solid(width, height).write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png).unwrap();
    buf
}

/// Serves the router on an ephemeral port and returns the base URL.
pub async fn spawn_server(state: Arc<AppState>) -> String {
    let app = faceswap_backend::api::routes::router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = TcpListener::bind(&addr).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

/// Wait for a condition to become true
pub async fn wait_for_condition<F>(mut condition: F, max_attempts: usize, delay_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    use tokio::time::{sleep, Duration};
    for _ in 0..max_attempts {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(delay_ms)).await;
    }
    condition()
}
