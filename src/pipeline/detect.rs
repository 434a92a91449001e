use std::borrow::Cow;
use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageOutputFormat};
use tracing::{debug, info, warn};

use crate::error::{FaceError, FaceResult};
use crate::models::{AnnotationRecord, FaceRecord, ImageInfo};
use crate::pipeline::geometry::{self, RawBox};
use crate::utils::path::ORIGINAL_FILENAME;

pub const JPEG_QUALITY: u8 = 90;

/// What is sent to the external face-detection capability.
#[derive(Debug, Clone)]
pub struct ProviderRequest<'a> {
    pub image: &'a [u8],
    pub max_face_num: u32,
    pub min_face_size: u32,
    pub model_version: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderFace {
    pub bbox: RawBox,
    pub confidence: Option<f64>,
}

/// Provider answer, in the coordinate space of the submitted image.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub faces: Vec<ProviderFace>,
    pub image_width: u32,
    pub image_height: u32,
}

/// External face-detection capability. Implementations perform exactly one
/// attempt and report failures as `FaceError`; there is no retry here.
pub trait FaceProvider: Send + Sync {
    fn submit(&self, request: &ProviderRequest<'_>) -> FaceResult<ProviderResponse>;
}

#[derive(Debug, Clone)]
pub struct DetectorLimits {
    pub max_edge: u32,
    pub max_payload_bytes: usize,
    pub padding_px: i64,
    pub max_face_num: u32,
    pub min_face_size: u32,
    pub model_version: String,
}

impl Default for DetectorLimits {
    fn default() -> Self {
        Self {
            max_edge: 4000,
            max_payload_bytes: 5 * 1024 * 1024,
            padding_px: 10,
            max_face_num: 120,
            min_face_size: 34,
            model_version: "3.0".to_string(),
        }
    }
}

/// Submission bytes plus the factor the original was shrunk by.
pub struct Submission<'a> {
    pub bytes: Cow<'a, [u8]>,
    pub scale: f64,
}

pub struct FaceDetector {
    provider: Arc<dyn FaceProvider>,
    limits: DetectorLimits,
}

impl FaceDetector {
    pub fn new(provider: Arc<dyn FaceProvider>, limits: DetectorLimits) -> Self {
        Self { provider, limits }
    }

    pub fn limits(&self) -> &DetectorLimits { &self.limits }

    pub fn detect(&self, image_bytes: &[u8]) -> FaceResult<AnnotationRecord> {
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| FaceError::ImageDecodeFailed(e.to_string()))?;
        self.detect_image(&img, image_bytes)
    }

    /// Detects faces on an already decoded image. `encoded` must be the bytes
    /// `img` was decoded from; they are submitted as-is when no resize is needed.
    pub fn detect_image(&self, img: &DynamicImage, encoded: &[u8]) -> FaceResult<AnnotationRecord> {
        let (orig_w, orig_h) = (img.width(), img.height());
        info!("Detecting faces on {}x{} image ({} bytes)", orig_w, orig_h, encoded.len());

        let submission = self.prepare_submission(img, encoded)?;
        let request = ProviderRequest {
            image: &submission.bytes,
            max_face_num: self.limits.max_face_num,
            min_face_size: self.limits.min_face_size,
            model_version: &self.limits.model_version,
        };
        let response = self.provider.submit(&request)?;
        info!("Provider returned {} faces", response.faces.len());

        Ok(self.map_response(&response, submission.scale, orig_w, orig_h))
    }

    pub fn prepare_submission<'a>(&self, img: &DynamicImage, encoded: &'a [u8]) -> FaceResult<Submission<'a>> {
        let (new_w, new_h, scale) = geometry::fit_long_edge(img.width(), img.height(), self.limits.max_edge);
        let bytes = if scale < 1.0 {
            debug!("Resizing to {}x{} (scale {:.4})", new_w, new_h, scale);
            let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::CatmullRom);
            Cow::Owned(encode_jpeg(&resized, JPEG_QUALITY)?)
        } else {
            Cow::Borrowed(encoded)
        };
        if bytes.len() > self.limits.max_payload_bytes {
            return Err(FaceError::ImageTooLarge { size: bytes.len(), max: self.limits.max_payload_bytes });
        }
        Ok(Submission { bytes, scale })
    }

    /// Provider boxes -> original-image face records, in emission order.
    pub fn map_response(&self, response: &ProviderResponse, scale: f64, orig_w: u32, orig_h: u32) -> AnnotationRecord {
        let padding = geometry::rescale(self.limits.padding_px, scale);
        let mut record = AnnotationRecord::empty(ImageInfo {
            width: orig_w,
            height: orig_h,
            filename: ORIGINAL_FILENAME.to_string(),
        });
        for (i, face) in response.faces.iter().enumerate() {
            let base = format!("face_{}", i + 1);
            let scaled = geometry::rescale_box(face.bbox, scale);
            let Some(coordinates) = geometry::pad_and_clamp(scaled, padding, orig_w, orig_h) else {
                warn!("Dropping {}: box {:?} lies outside the {}x{} image", base, face.bbox, orig_w, orig_h);
                continue;
            };
            debug!("{}: provider {:?} -> original {:?}", base, face.bbox, coordinates);
            record.faces.push(FaceRecord {
                filename: format!("{}.jpg", base),
                coordinates,
                confidence: face.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
                manual: false,
                face_id: Some(base),
            });
        }
        record
    }
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> FaceResult<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Jpeg(quality))
        .map_err(|e| FaceError::Encode(e.to_string()))?;
    Ok(buf)
}
