//! Utility modules for common functionality
//!
//! Logging setup, progress reporting and TIFF tag naming.

pub mod logger;
pub mod progress;
pub mod tag_utils;

pub use progress::ProgressTracker;
