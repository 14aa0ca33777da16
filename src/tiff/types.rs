//! Core TIFF data structures

use crate::io::byte_order::ByteOrder;
use crate::tiff::ifd::IFD;
use std::fmt;

/// Parsed directory structure of a TIFF file
#[derive(Debug, Clone)]
pub struct TIFF {
    /// Top-level IFDs in chain order
    pub ifds: Vec<IFD>,
    /// Child IFDs referenced through SubIFDs, keyed by parent IFD number
    pub sub_ifds: Vec<(usize, Vec<IFD>)>,
    /// Whether this is a BigTIFF format
    pub is_big_tiff: bool,
    pub byte_order: ByteOrder,
}

impl TIFF {
    /// Creates a new empty TIFF structure
    pub fn new(is_big_tiff: bool, byte_order: ByteOrder) -> Self {
        TIFF {
            ifds: Vec::new(),
            sub_ifds: Vec::new(),
            is_big_tiff,
            byte_order,
        }
    }

    /// Returns the main (first) IFD if available
    pub fn main_ifd(&self) -> Option<&IFD> {
        self.ifds.first()
    }

    /// Returns the number of IFDs in the TIFF file
    pub fn ifd_count(&self) -> usize {
        self.ifds.len()
    }

    /// Full-resolution pages (everything not flagged as reduced resolution)
    pub fn pages(&self) -> Vec<&IFD> {
        self.ifds.iter().filter(|ifd| !ifd.is_reduced_resolution()).collect()
    }

    /// Returns all overview IFDs (subfile type bit 1)
    pub fn overviews(&self) -> Vec<&IFD> {
        self.ifds.iter().filter(|ifd| ifd.is_reduced_resolution()).collect()
    }

    /// SubIFD children of a top-level IFD
    pub fn children_of(&self, number: usize) -> &[IFD] {
        self.sub_ifds
            .iter()
            .find(|(parent, _)| *parent == number)
            .map(|(_, children)| children.as_slice())
            .unwrap_or(&[])
    }
}

impl fmt::Display for TIFF {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TIFF File:")?;
        writeln!(f, "  Format: {}", if self.is_big_tiff { "BigTIFF" } else { "TIFF" })?;
        writeln!(f, "  Byte order: {}", self.byte_order.name())?;
        writeln!(f, "  Number of IFDs: {}", self.ifds.len())?;

        if let Some(ifd) = self.main_ifd() {
            write!(f, "{}", ifd)?;
        }

        Ok(())
    }
}
