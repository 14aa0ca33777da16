//! Seekable streams over dataset files
//!
//! Readers and writers hold one buffered handle per open file. Dropping the
//! handle is the only way it is released, so `close()` implementations
//! just drop the value returned here.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use log::trace;

use crate::errors::FormatResult;

/// Input stream that supports random access
pub trait SeekableReader: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> SeekableReader for T {}

/// Output stream that can go back to patch earlier bytes
pub trait SeekableWriter: Write + Seek + Send {}

impl<T: Write + Seek + Send> SeekableWriter for T {}

/// Opens `path` for buffered random-access reads
pub fn open_buffered(path: &Path) -> FormatResult<BufReader<File>> {
    trace!("Opening {:?} for reading", path);
    Ok(BufReader::new(File::open(path)?))
}

/// Creates (or truncates) `path` for buffered writes
pub fn create_buffered(path: &Path) -> FormatResult<BufWriter<File>> {
    trace!("Creating {:?}", path);
    Ok(BufWriter::new(File::create(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::SeekFrom;

    #[test]
    fn test_buffered_handles_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bytes.bin");
        {
            let mut out = create_buffered(&path).unwrap();
            out.write_all(b"planeio").unwrap();
            out.flush().unwrap();
        }
        let mut input = open_buffered(&path).unwrap();
        input.seek(SeekFrom::Start(5)).unwrap();
        let mut rest = String::new();
        input.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "io");
        assert!(open_buffered(&dir.path().join("missing.bin")).is_err());
    }
}
