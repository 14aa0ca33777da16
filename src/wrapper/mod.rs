//! Reader wrappers
//!
//! Each wrapper owns an inner [`FormatReader`](crate::reader::FormatReader)
//! and adds one transform on top of it. [`Pipeline`] nests them in the
//! order they depend on each other.

pub mod channel_filler;
pub mod channel_separator;
pub mod image_buffer;
pub mod min_max;
pub mod pipeline;

pub use channel_filler::ChannelFiller;
pub use channel_separator::ChannelSeparator;
pub use image_buffer::ImageBufferReader;
pub use min_max::MinMaxCalculator;
pub use pipeline::Pipeline;
