use serde::{Deserialize, Serialize};

/// Axis-aligned face box in original-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceCoordinates {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl FaceCoordinates {
    pub fn width(&self) -> u32 { self.x2.saturating_sub(self.x1) }
    pub fn height(&self) -> u32 { self.y2.saturating_sub(self.y1) }
}

fn default_confidence() -> f64 { 1.0 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub filename: String,
    pub coordinates: FaceCoordinates,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub manual: bool,
    // Records written before face ids existed carry none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub filename: String,
}

/// The per-event `metadata.json` document. Field names are a stored format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub image_info: ImageInfo,
    #[serde(default)]
    pub faces: Vec<FaceRecord>,
}

impl AnnotationRecord {
    pub fn empty(image_info: ImageInfo) -> Self {
        Self { image_info, faces: Vec::new() }
    }
}

/// Sidecar written next to a QQ avatar, looked up by face base name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QqAvatarSidecar {
    pub qq_number: String,
    pub filename: String,
}

/// Processing state derived from artifact presence; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessStatus {
    NotFound,
    Processing,
    Completed { faces_count: usize },
}

impl ProcessStatus {
    pub fn message(&self) -> String {
        match self {
            ProcessStatus::NotFound => "No image uploaded".to_string(),
            ProcessStatus::Processing => "Processing in progress".to_string(),
            ProcessStatus::Completed { faces_count } => {
                format!("Processing completed, {} faces detected", faces_count)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_stable_keys() {
        let record = AnnotationRecord {
            image_info: ImageInfo { width: 640, height: 480, filename: "original.jpg".into() },
            faces: vec![FaceRecord {
                filename: "face_1.jpg".into(),
                coordinates: FaceCoordinates { x1: 1, y1: 2, x2: 30, y2: 40 },
                confidence: 1.0,
                manual: false,
                face_id: Some("face_1".into()),
            }],
        };
        let v = serde_json::to_value(&record).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(v["image_info"]["width"], 640);
        assert_eq!(v["faces"][0]["coordinates"]["x2"], 30);
        assert_eq!(v["faces"][0]["face_id"], "face_1");
    }

    #[test]
    fn legacy_face_without_provenance_fields_parses() {
        let raw = r#"{
            "image_info": {"width": 100, "height": 80, "filename": "original.jpg"},
            "faces": [{"filename": "face_1.jpg", "coordinates": {"x1": 0, "y1": 0, "x2": 10, "y2": 10}}]
        }"#;
        let record: AnnotationRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.faces[0].confidence, 1.0);
        assert!(!record.faces[0].manual);
        assert_eq!(record.faces[0].face_id, None);
    }

    #[test]
    fn status_serializes_flat() {
        let v = serde_json::to_value(ProcessStatus::Completed { faces_count: 3 }).unwrap();
        assert_eq!(v["status"], "completed");
        assert_eq!(v["faces_count"], 3);
        let v = serde_json::to_value(ProcessStatus::Processing).unwrap();
        assert_eq!(v["status"], "processing");
    }
}
