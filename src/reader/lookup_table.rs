//! Color lookup tables of indexed images

/// Palette with one row per output component
#[derive(Debug, Clone, PartialEq)]
pub enum LookupTable {
    Bits8(Vec<Vec<u8>>),
    Bits16(Vec<Vec<u16>>),
}

impl LookupTable {
    /// Number of output components (3 for an RGB palette)
    pub fn components(&self) -> usize {
        match self {
            LookupTable::Bits8(rows) => rows.len(),
            LookupTable::Bits16(rows) => rows.len(),
        }
    }

    /// Entries per component
    pub fn len(&self) -> usize {
        match self {
            LookupTable::Bits8(rows) => rows.first().map(Vec::len).unwrap_or(0),
            LookupTable::Bits16(rows) => rows.first().map(Vec::len).unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of one looked-up sample
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            LookupTable::Bits8(_) => 1,
            LookupTable::Bits16(_) => 2,
        }
    }

    /// Value of `component` at `index`; indices past the end clamp to the last entry
    pub fn value(&self, component: usize, index: usize) -> u16 {
        match self {
            LookupTable::Bits8(rows) => rows
                .get(component)
                .and_then(|row| row.get(index.min(row.len().saturating_sub(1))))
                .map(|&v| v as u16)
                .unwrap_or(0),
            LookupTable::Bits16(rows) => rows
                .get(component)
                .and_then(|row| row.get(index.min(row.len().saturating_sub(1))))
                .copied()
                .unwrap_or(0),
        }
    }

    /// Builds a table from a TIFF ColorMap (all reds, then greens, then blues)
    pub fn from_color_map(values: &[u64], bits_per_sample: u16) -> Option<Self> {
        let entries = 1usize << bits_per_sample.min(16);
        if values.len() < entries * 3 {
            return None;
        }
        let rows: Vec<Vec<u16>> = (0..3)
            .map(|c| values[c * entries..(c + 1) * entries].iter().map(|&v| v as u16).collect())
            .collect();
        if bits_per_sample <= 8 {
            // 8-bit palettes are stored scaled to 16 bits
            Some(LookupTable::Bits8(
                rows.into_iter()
                    .map(|row| row.into_iter().map(|v| (v >> 8) as u8).collect())
                    .collect(),
            ))
        } else {
            Some(LookupTable::Bits16(rows))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_map_scaling() {
        let mut map = vec![0u64; 3 * 256];
        map[1] = 0xFF00;
        map[256 + 2] = 0x8000;
        let lut = LookupTable::from_color_map(&map, 8).unwrap();
        assert_eq!(lut.components(), 3);
        assert_eq!(lut.len(), 256);
        assert_eq!(lut.value(0, 1), 0xFF);
        assert_eq!(lut.value(1, 2), 0x80);
        assert_eq!(lut.value(2, 999), 0);
    }

    #[test]
    fn test_short_color_map_is_rejected() {
        assert!(LookupTable::from_color_map(&[0; 10], 8).is_none());
    }
}
