//! Assigns the numeric blocks of a file pattern to Z, C or T
//!
//! A block's axis comes from the word right before it (`z`, `ch`, `tp`,
//! ...). Blocks without a recognizable prefix fill the axes the member
//! files do not use yet, Z first, then T, then C.

use log::debug;

use crate::errors::{FormatError, FormatResult};
use super::file_pattern::FilePattern;

const Z_PREFIXES: &[&str] = &["fp", "sec", "z", "zs", "focal", "focalplane"];
const C_PREFIXES: &[&str] = &["c", "ch", "w", "wavelength"];
const T_PREFIXES: &[&str] = &["t", "tl", "tp", "time"];
const S_PREFIXES: &[&str] = &["s", "series", "sp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Z,
    C,
    T,
    /// Series index; series blocks are never stitched
    S,
    Unknown,
}

impl Axis {
    /// Axis named by the trailing word of `prefix`
    pub fn from_prefix(prefix: &str) -> Axis {
        let start = prefix
            .char_indices()
            .rev()
            .find(|(_, c)| !c.is_ascii_alphabetic())
            .map_or(0, |(i, c)| i + c.len_utf8());
        let word = prefix[start..].to_ascii_lowercase();
        let matches = |list: &[&str]| list.contains(&word.as_str());
        if matches(Z_PREFIXES) {
            Axis::Z
        } else if matches(C_PREFIXES) {
            Axis::C
        } else if matches(T_PREFIXES) {
            Axis::T
        } else if matches(S_PREFIXES) {
            Axis::S
        } else {
            Axis::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisGuesser {
    axes: Vec<Axis>,
}

impl AxisGuesser {
    /// Guesses axes for `pattern`, given the Z, effective C and T sizes of
    /// one member file
    pub fn new(pattern: &FilePattern, size_z: usize, size_c: usize, size_t: usize) -> Self {
        let mut axes: Vec<Axis> = (0..pattern.blocks().len())
            .map(|i| Axis::from_prefix(pattern.prefix(i)))
            .collect();

        let mut used_z = size_z > 1 || axes.contains(&Axis::Z);
        let mut used_t = size_t > 1 || axes.contains(&Axis::T);
        let mut used_c = size_c > 1 || axes.contains(&Axis::C);
        for axis in axes.iter_mut() {
            match *axis {
                Axis::Unknown => {
                    *axis = if !used_z {
                        used_z = true;
                        Axis::Z
                    } else if !used_t {
                        used_t = true;
                        Axis::T
                    } else if !used_c {
                        used_c = true;
                        Axis::C
                    } else {
                        Axis::T
                    };
                }
                Axis::S => {
                    debug!("Series block in {} is stitched along T", pattern.pattern());
                    *axis = Axis::T;
                }
                _ => {}
            }
        }
        AxisGuesser { axes }
    }

    /// Axis of each block, in block order
    pub fn axis_types(&self) -> &[Axis] {
        &self.axes
    }

    /// Overrides the guess; every block needs a Z, C or T axis
    pub fn set_axis_types(&mut self, axes: Vec<Axis>) -> FormatResult<()> {
        if axes.len() != self.axes.len() {
            return Err(FormatError::GenericError(format!(
                "Expected {} axis types, got {}",
                self.axes.len(),
                axes.len()
            )));
        }
        if let Some(bad) = axes.iter().find(|a| !matches!(a, Axis::Z | Axis::C | Axis::T)) {
            return Err(FormatError::GenericError(format!("Cannot stitch along {:?}", bad)));
        }
        self.axes = axes;
        Ok(())
    }

    pub fn axis_count(&self, axis: Axis) -> usize {
        self.axes.iter().filter(|&&a| a == axis).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(Axis::from_prefix("img_z"), Axis::Z);
        assert_eq!(Axis::from_prefix("cell_Ch"), Axis::C);
        assert_eq!(Axis::from_prefix("run-tp"), Axis::T);
        assert_eq!(Axis::from_prefix("focalplane"), Axis::Z);
        assert_eq!(Axis::from_prefix("series"), Axis::S);
        assert_eq!(Axis::from_prefix("image"), Axis::Unknown);
        assert_eq!(Axis::from_prefix(""), Axis::Unknown);
    }

    #[test]
    fn test_named_and_fallback_axes() {
        let pattern = FilePattern::new("stack_c<1-2>_<1-4>.tif").unwrap();
        let guesser = AxisGuesser::new(&pattern, 1, 1, 1);
        assert_eq!(guesser.axis_types(), &[Axis::C, Axis::Z]);

        // Z is taken by the member files, so the unnamed block becomes T
        let guesser = AxisGuesser::new(&FilePattern::new("vol<1-5>.tif").unwrap(), 12, 1, 1);
        assert_eq!(guesser.axis_types(), &[Axis::T]);
    }

    #[test]
    fn test_override() {
        let pattern = FilePattern::new("a<1-2>b<1-3>.tif").unwrap();
        let mut guesser = AxisGuesser::new(&pattern, 1, 1, 1);
        assert_eq!(guesser.axis_types(), &[Axis::Z, Axis::T]);
        guesser.set_axis_types(vec![Axis::C, Axis::T]).unwrap();
        assert_eq!(guesser.axis_count(Axis::C), 1);
        assert!(guesser.set_axis_types(vec![Axis::C]).is_err());
        assert!(guesser.set_axis_types(vec![Axis::S, Axis::T]).is_err());
    }
}
