pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff", "webp"];

/// 10 MiB, the largest payload sent in a single backend request.
pub const DEFAULT_MAX_REQUEST_SIZE: u64 = 10 * 1024 * 1024;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ABOVE_THRESHOLD: f64 = 0.95;

pub const DEFAULT_COMPREFACE_URL: &str = "http://localhost:8080";
pub const DEFAULT_DOUBLETAKE_URL: &str = "http://localhost:3000";

/// Label given to files that sit directly under the dataset root.
pub const UNLABELED_LABEL: &str = "unlabeled";

/// CompreFace error code for "No face is found in the given image".
pub const COMPREFACE_NO_FACE_CODE: u32 = 28;

/// Name DoubleTake reports when a face matched nobody.
pub const DOUBLETAKE_UNKNOWN_NAME: &str = "unknown";
