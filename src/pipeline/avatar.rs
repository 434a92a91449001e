use std::time::Duration;

use serde::Deserialize;

use crate::error::{FaceError, FaceResult};

/// Third-party nickname / avatar lookup by numeric account id.
pub trait AvatarSource: Send + Sync {
    fn nickname(&self, qq_number: &str) -> FaceResult<String>;
    fn fetch_avatar(&self, qq_number: &str) -> FaceResult<Vec<u8>>;
}

pub fn fallback_nickname(qq_number: &str) -> String {
    format!("QQ用户{}", qq_number)
}

/// Accepts only non-empty all-digit ids; anything else never reaches the network.
pub fn is_valid_qq_number(qq_number: &str) -> bool {
    !qq_number.is_empty() && qq_number.len() <= 12 && qq_number.bytes().all(|b| b.is_ascii_digit())
}

pub struct QqAvatarClient {
    nickname_url: String,
    avatar_url: String,
    nickname_timeout: Duration,
    avatar_timeout: Duration,
}

impl Default for QqAvatarClient {
    fn default() -> Self {
        Self {
            nickname_url: "https://api.ilingku.com/int/v1/qqname".to_string(),
            avatar_url: "https://q1.qlogo.cn/g".to_string(),
            nickname_timeout: Duration::from_secs(10),
            avatar_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Deserialize)]
struct NameResponse {
    code: i64,
    #[serde(default)]
    name: String,
}

impl QqAvatarClient {
    fn client(&self, timeout: Duration) -> FaceResult<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| FaceError::ProviderUnavailable(e.to_string()))
    }
}

impl AvatarSource for QqAvatarClient {
    fn nickname(&self, qq_number: &str) -> FaceResult<String> {
        let resp = self
            .client(self.nickname_timeout)?
            .get(&self.nickname_url)
            .query(&[("qq", qq_number)])
            .send()
            .map_err(|e| FaceError::ProviderUnavailable(e.to_string()))?;
        let body: NameResponse = resp
            .json()
            .map_err(|e| FaceError::ProviderUnavailable(format!("malformed nickname response: {}", e)))?;
        if body.code == 200 && !body.name.is_empty() {
            Ok(body.name)
        } else {
            Ok(fallback_nickname(qq_number))
        }
    }

    fn fetch_avatar(&self, qq_number: &str) -> FaceResult<Vec<u8>> {
        let resp = self
            .client(self.avatar_timeout)?
            .get(&self.avatar_url)
            .query(&[("b", "qq"), ("nk", qq_number), ("s", "640")])
            .send()
            .map_err(|e| FaceError::ProviderUnavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(FaceError::ProviderUnavailable(format!("avatar download failed: HTTP {}", resp.status())));
        }
        let bytes = resp.bytes().map_err(|e| FaceError::ProviderUnavailable(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
