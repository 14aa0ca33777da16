//! Numbered file sequences read as one dataset

pub mod axis_guesser;
pub mod file_pattern;
pub mod file_stitcher;

pub use axis_guesser::{Axis, AxisGuesser};
pub use file_pattern::{FilePattern, PatternBlock};
pub use file_stitcher::FileStitcher;
