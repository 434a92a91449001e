pub mod annotation;
pub mod locks;

pub use annotation::AnnotationStore;
pub use locks::EventLocks;
