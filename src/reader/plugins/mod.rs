//! Concrete format plugins

pub mod fake_reader;
pub mod image_io_reader;
pub mod tiff_reader;

pub use fake_reader::{FakeParams, FakeReader};
pub use image_io_reader::ImageIoReader;
pub use tiff_reader::TiffReader;
