//! Tencent Cloud IAI `DetectFace` client.
//!
//! Requests are JSON bodies signed with TC3-HMAC-SHA256. The client is built
//! per call so it only ever lives on a blocking worker thread.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{FaceError, FaceResult};
use crate::pipeline::detect::{FaceProvider, ProviderFace, ProviderRequest, ProviderResponse};
use crate::pipeline::geometry::RawBox;

const HOST: &str = "iai.tencentcloudapi.com";
const SERVICE: &str = "iai";
const ACTION: &str = "DetectFace";
const VERSION: &str = "2020-03-03";
const ALGORITHM: &str = "TC3-HMAC-SHA256";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug)]
pub struct TencentCredentials {
    pub secret_id: String,
    pub secret_key: String,
}

pub struct TencentFaceProvider {
    credentials: Option<TencentCredentials>,
    region: String,
    timeout: Duration,
    endpoint: String,
}

impl TencentFaceProvider {
    pub fn new(credentials: Option<TencentCredentials>, region: impl Into<String>, timeout: Duration) -> Self {
        Self {
            credentials,
            region: region.into(),
            timeout,
            endpoint: format!("https://{}", HOST),
        }
    }

    /// Points the client at another base URL (e.g. a local stub).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectFaceBody<'a> {
    image: String,
    max_face_num: u32,
    min_face_size: u32,
    face_model_version: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope {
    response: DetectFaceResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectFaceResponse {
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    image_width: Option<i64>,
    #[serde(default)]
    image_height: Option<i64>,
    #[serde(default)]
    face_infos: Vec<FaceInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    code: String,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FaceInfo {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], msg: &str) -> FaceResult<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| FaceError::ProviderUnavailable(format!("invalid signing key: {}", e)))?;
    mac.update(msg.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Value of the `Authorization` header for `payload` sent at `timestamp`.
pub fn authorization(credentials: &TencentCredentials, payload: &str, timestamp: i64) -> FaceResult<String> {
    let date = chrono::DateTime::<chrono::Utc>::from_timestamp(timestamp, 0)
        .ok_or_else(|| FaceError::ProviderUnavailable(format!("invalid request timestamp {}", timestamp)))?
        .format("%Y-%m-%d")
        .to_string();

    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{}\nhost:{}\n\ncontent-type;host\n{}",
        CONTENT_TYPE,
        HOST,
        sha256_hex(payload.as_bytes())
    );
    let scope = format!("{}/{}/tc3_request", date, SERVICE);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        timestamp,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let secret_date = hmac_sha256(format!("TC3{}", credentials.secret_key).as_bytes(), &date)?;
    let secret_service = hmac_sha256(&secret_date, SERVICE)?;
    let secret_signing = hmac_sha256(&secret_service, "tc3_request")?;
    let signature = hex::encode(hmac_sha256(&secret_signing, &string_to_sign)?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders=content-type;host, Signature={}",
        ALGORITHM, credentials.secret_id, scope, signature
    ))
}

fn parse_response(body: &[u8]) -> FaceResult<ProviderResponse> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| FaceError::ProviderUnavailable(format!("malformed DetectFace response: {}", e)))?;
    let resp = envelope.response;
    if let Some(err) = resp.error {
        return Err(FaceError::ProviderUnavailable(format!("{}: {}", err.code, err.message)));
    }
    let faces = resp
        .face_infos
        .into_iter()
        .map(|f| ProviderFace {
            bbox: RawBox { x: f.x, y: f.y, width: f.width, height: f.height },
            confidence: None,
        })
        .collect();
    Ok(ProviderResponse {
        faces,
        image_width: resp.image_width.unwrap_or(0).max(0) as u32,
        image_height: resp.image_height.unwrap_or(0).max(0) as u32,
    })
}

impl FaceProvider for TencentFaceProvider {
    fn submit(&self, request: &ProviderRequest<'_>) -> FaceResult<ProviderResponse> {
        let credentials = self
            .credentials
            .as_ref()
            .filter(|c| !c.secret_id.is_empty() && !c.secret_key.is_empty())
            .ok_or(FaceError::CredentialsMissing)?;

        let body = DetectFaceBody {
            image: STANDARD.encode(request.image),
            max_face_num: request.max_face_num,
            min_face_size: request.min_face_size,
            face_model_version: request.model_version,
        };
        let payload = serde_json::to_string(&body)
            .map_err(|e| FaceError::ProviderUnavailable(format!("failed to encode request: {}", e)))?;
        let timestamp = chrono::Utc::now().timestamp();
        let auth = authorization(credentials, &payload, timestamp)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| FaceError::ProviderUnavailable(format!("failed to create HTTP client: {}", e)))?;

        debug!("Calling {} {} ({} byte payload)", self.endpoint, ACTION, payload.len());
        let response = client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header(reqwest::header::HOST, HOST)
            .header(reqwest::header::AUTHORIZATION, auth)
            .header("X-TC-Action", ACTION)
            .header("X-TC-Version", VERSION)
            .header("X-TC-Region", &self.region)
            .header("X-TC-Timestamp", timestamp.to_string())
            .body(payload)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    FaceError::ProviderUnavailable(format!("DetectFace timed out after {:?}", self.timeout))
                } else {
                    FaceError::ProviderUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .map_err(|e| FaceError::ProviderUnavailable(format!("failed to read response: {}", e)))?;
        if !status.is_success() {
            warn!("DetectFace answered HTTP {}", status);
            return Err(FaceError::ProviderUnavailable(format!("HTTP {}", status)));
        }
        parse_response(&bytes)
    }
}
