//! Compression codecs for tile and strip data
//!
//! Every codec implements [`CompressionHandler`]; handlers are stateless
//! and may be shared across threads. [`CompressionType`] carries the
//! stable codec names and the TIFF compression codes.

mod handler;
mod uncompressed;
mod lzw;
mod deflate;
mod jpeg;
mod jpeg2000;
mod ebcot;
mod zstd;
mod factory;
mod converter;

pub use handler::{CodecOptions, CompressionHandler};
pub use uncompressed::UncompressedHandler;
pub use lzw::LzwHandler;
pub use deflate::DeflateHandler;
pub use jpeg::JpegHandler;
pub use jpeg2000::Jpeg2000Handler;
pub use zstd::ZstdHandler;
pub use factory::{CompressionFactory, CompressionType};
pub use converter::DatasetConverter;
