pub mod utils;
pub mod error;
pub mod models;
pub mod db;
pub mod store;
pub mod pipeline;
pub mod api;

use std::path::PathBuf;
use std::sync::Arc;

pub use error::{FaceError, FaceResult};

#[derive(Clone)]
pub struct AppPaths {
    pub storage: PathBuf,
    pub db_path: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    pub started_at: std::time::Instant,
    pub paths: AppPaths,
    pub pool: db::DbPool,
    pub registry: Arc<dyn db::EventRegistry>,
    pub pipeline: pipeline::FacePipeline,
}

impl AppState {
    pub fn new(paths: AppPaths, pool: db::DbPool, pipeline: pipeline::FacePipeline) -> Self {
        let registry: Arc<dyn db::EventRegistry> = Arc::new(db::SqliteRegistry::new(pool.clone()));
        Self::with_registry(paths, pool, registry, pipeline)
    }

    pub fn with_registry(
        paths: AppPaths,
        pool: db::DbPool,
        registry: Arc<dyn db::EventRegistry>,
        pipeline: pipeline::FacePipeline,
    ) -> Self {
        Self {
            started_at: std::time::Instant::now(),
            paths,
            pool,
            registry,
            pipeline,
        }
    }
}
