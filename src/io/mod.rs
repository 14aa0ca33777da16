//! File access
//!
//! Seekable buffered streams and the byte-order strategy used to decode
//! and encode multi-byte values.

pub mod byte_order;
pub mod seekable;

pub use seekable::{create_buffered, open_buffered, SeekableReader, SeekableWriter};
