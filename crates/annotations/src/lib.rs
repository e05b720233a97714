//! Matches detection/tracking annotations to the frame they were computed
//! for, by server timestamp.

pub mod buffer;
pub mod record;

pub use buffer::{AnnotationBuffer, DEFAULT_CAPACITY, DEFAULT_TOLERANCE};
pub use record::{AnnotationRecord, ModelDetection};
