pub mod io;
pub mod errors;
pub mod pixels;
pub mod meta;
pub mod tiff;
pub mod compression;
pub mod reader;
pub mod stitcher;
pub mod wrapper;
pub mod writer;
pub mod config;
pub mod utils;
pub mod commands;

pub use errors::{FormatError, FormatResult};
pub use pixels::{DimensionOrder, PixelType, Region};
pub use reader::{CoreMetadata, FormatReader, ImageReader};
pub use stitcher::FileStitcher;
pub use wrapper::{ChannelFiller, ChannelSeparator, MinMaxCalculator, Pipeline};
pub use writer::{FormatWriter, TiffWriter};
pub use config::Options;
