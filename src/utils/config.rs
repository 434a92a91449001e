use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::detect::DetectorLimits;
use crate::pipeline::tencent::TencentCredentials;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub storage_dir: PathBuf,
    pub db_path: PathBuf,
    pub face_threads: usize,
    pub detect_timeout_secs: u64,
    pub max_edge: u32,
    pub max_payload_bytes: usize,
    pub tencent_secret_id: Option<String>,
    pub tencent_secret_key: Option<String>,
    pub tencent_region: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("FACESWAP_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(5001);
        let storage_dir = env::var("FACESWAP_STORAGE_DIR").unwrap_or_else(|_| "./data/storage".to_string());
        let db_path = env::var("FACESWAP_DB").unwrap_or_else(|_| "./data/app.db".to_string());
        let face_threads = env::var("FACESWAP_FACE_THREADS").ok().and_then(|v| v.parse().ok()).unwrap_or(1);
        let detect_timeout_secs = env::var("FACESWAP_DETECT_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60);
        let max_edge = env::var("FACESWAP_MAX_EDGE").ok().and_then(|v| v.parse().ok()).unwrap_or(4000);
        let max_payload_bytes = env::var("FACESWAP_MAX_PAYLOAD_BYTES").ok().and_then(|v| v.parse().ok()).unwrap_or(5 * 1024 * 1024);
        let tencent_secret_id = env::var("TENCENTCLOUD_SECRET_ID").ok().filter(|v| !v.trim().is_empty());
        let tencent_secret_key = env::var("TENCENTCLOUD_SECRET_KEY").ok().filter(|v| !v.trim().is_empty());
        let tencent_region = env::var("TENCENTCLOUD_REGION").unwrap_or_else(|_| "ap-guangzhou".to_string());
        Self {
            port,
            storage_dir: PathBuf::from(storage_dir),
            db_path: PathBuf::from(db_path),
            face_threads: face_threads.max(1),
            detect_timeout_secs,
            max_edge: max_edge.max(1),
            max_payload_bytes,
            tencent_secret_id,
            tencent_secret_key,
            tencent_region,
        }
    }

    /// Both halves present, or nothing.
    pub fn tencent_credentials(&self) -> Option<TencentCredentials> {
        match (&self.tencent_secret_id, &self.tencent_secret_key) {
            (Some(id), Some(key)) => Some(TencentCredentials { secret_id: id.clone(), secret_key: key.clone() }),
            _ => None,
        }
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_secs(self.detect_timeout_secs)
    }

    pub fn detector_limits(&self) -> DetectorLimits {
        DetectorLimits {
            max_edge: self.max_edge,
            max_payload_bytes: self.max_payload_bytes,
            ..DetectorLimits::default()
        }
    }
}
