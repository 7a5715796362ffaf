mod backend;
mod backends;
mod loader;
mod nms;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use loader::{load_backend, DEFAULT_INPUT_SIZE};
pub use nms::non_max_suppression;
pub use result::{BBox, BoxDetection, InferenceResult};
