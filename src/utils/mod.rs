pub mod progress;
pub mod retry;

pub use progress::{ProgressStream, ProgressTracker, format_bytes};
pub use retry::RetryStrategy;
