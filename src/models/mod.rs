pub mod annotation;

pub use annotation::{AnnotationRecord, FaceCoordinates, FaceRecord, ImageInfo, ProcessStatus, QqAvatarSidecar};
