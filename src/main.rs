use std::net::SocketAddr;
use std::sync::Arc;

use faceswap_backend::db::{self, ActivityLog};
use faceswap_backend::pipeline::avatar::QqAvatarClient;
use faceswap_backend::pipeline::detect::FaceDetector;
use faceswap_backend::pipeline::face::FaceProcessor;
use faceswap_backend::pipeline::tencent::TencentFaceProvider;
use faceswap_backend::pipeline::FacePipeline;
use faceswap_backend::store::{AnnotationStore, EventLocks};
use faceswap_backend::utils::config::Config;
use faceswap_backend::utils::logging;
use faceswap_backend::utils::path::StoragePaths;
use faceswap_backend::{AppPaths, AppState};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cfg = Config::from_env();
    std::fs::create_dir_all(cfg.storage_dir.join("events"))?;

    let pool = db::create_pool(&cfg.db_path, 8)?;

    let credentials = cfg.tencent_credentials();
    if credentials.is_none() {
        warn!("TENCENTCLOUD_SECRET_ID / TENCENTCLOUD_SECRET_KEY not set; face detection will fail");
    }
    let provider = TencentFaceProvider::new(credentials, cfg.tencent_region.clone(), cfg.detect_timeout());
    let detector = FaceDetector::new(Arc::new(provider), cfg.detector_limits());

    let store = AnnotationStore::new(StoragePaths::new(&cfg.storage_dir), EventLocks::new());
    let processor = FaceProcessor::new(store, detector, Arc::new(QqAvatarClient::default()), ActivityLog::new(pool.clone()));
    let pipeline = FacePipeline::start(processor, cfg.face_threads);

    let paths = AppPaths { storage: cfg.storage_dir.clone(), db_path: cfg.db_path.clone() };
    let state = Arc::new(AppState::new(paths, pool, pipeline));

    let app = faceswap_backend::api::routes::router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}
