//! File name patterns describing numbered file sequences
//!
//! A pattern is a path with blocks in angle brackets. A block is a numeric
//! range `<1-12>` (zero padded when both ends have the same width, with an
//! optional `:step`), a letter range `<A-D>` or a list `<red,green,blue>`.
//! The first block varies fastest when the pattern is expanded into files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::errors::{FormatError, FormatResult};
use super::axis_guesser::Axis;

lazy_static! {
    static ref NUMBER_RANGE: Regex =
        Regex::new(r"^(\d+)-(\d+)(?::(\d+))?$").expect("number range pattern compiles");
    static ref LETTER_RANGE: Regex =
        Regex::new(r"^([A-Za-z])-([A-Za-z])(?::(\d+))?$").expect("letter range pattern compiles");
}

/// One `<...>` block of a pattern
#[derive(Debug, Clone, PartialEq)]
pub struct PatternBlock {
    text: String,
    elements: Vec<String>,
}

fn invalid(block: &str, why: &str) -> FormatError {
    FormatError::GenericError(format!("Invalid pattern block {}: {}", block, why))
}

impl PatternBlock {
    pub fn parse(text: &str) -> FormatResult<Self> {
        let body = text
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .ok_or_else(|| invalid(text, "missing angle brackets"))?;

        let elements = if let Some(caps) = NUMBER_RANGE.captures(body) {
            let (first, last) = (&caps[1], &caps[2]);
            let parse = |s: &str| s.parse::<u64>().map_err(|_| invalid(text, "number out of range"));
            let (begin, end) = (parse(first)?, parse(last)?);
            let step = caps.get(3).map_or(Ok(1), |m| parse(m.as_str()))?;
            if step == 0 || begin > end {
                return Err(invalid(text, "empty range"));
            }
            let width = if first.len() == last.len() { first.len() } else { 0 };
            (begin..=end)
                .step_by(step as usize)
                .map(|n| format!("{:0width$}", n, width = width))
                .collect()
        } else if let Some(caps) = LETTER_RANGE.captures(body) {
            let (begin, end) = (caps[1].as_bytes()[0], caps[2].as_bytes()[0]);
            let step = caps
                .get(3)
                .map_or(Ok(1), |m| m.as_str().parse::<usize>().map_err(|_| invalid(text, "bad step")))?;
            if step == 0 || begin > end {
                return Err(invalid(text, "empty range"));
            }
            (begin..=end).step_by(step).map(|b| (b as char).to_string()).collect()
        } else if body.contains(',') {
            body.split(',').map(str::to_string).collect()
        } else if !body.is_empty() {
            vec![body.to_string()]
        } else {
            return Err(invalid(text, "empty block"));
        };
        Ok(PatternBlock {
            text: text.to_string(),
            elements,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilePattern {
    pattern: String,
    /// Byte ranges of each block within `pattern`, brackets included
    spans: Vec<(usize, usize)>,
    blocks: Vec<PatternBlock>,
    files: Vec<PathBuf>,
}

impl FilePattern {
    pub fn new(pattern: &str) -> FormatResult<Self> {
        let mut spans = Vec::new();
        let mut open = None;
        for (i, c) in pattern.char_indices() {
            match (c, open) {
                ('<', None) => open = Some(i),
                ('>', Some(start)) => {
                    spans.push((start, i + 1));
                    open = None;
                }
                ('<', Some(_)) | ('>', None) => {
                    return Err(FormatError::GenericError(format!(
                        "Bad block marker order in {}",
                        pattern
                    )))
                }
                _ => {}
            }
        }
        if open.is_some() {
            return Err(FormatError::GenericError(format!("Mismatched block markers in {}", pattern)));
        }
        let blocks = spans
            .iter()
            .map(|&(s, e)| PatternBlock::parse(&pattern[s..e]))
            .collect::<FormatResult<Vec<_>>>()?;

        let mut fp = FilePattern {
            pattern: pattern.to_string(),
            spans,
            blocks,
            files: Vec::new(),
        };
        fp.files = fp.expand();
        Ok(fp)
    }

    fn expand(&self) -> Vec<PathBuf> {
        let count = self.count();
        let total: usize = count.iter().product();
        (0..total)
            .map(|raster| {
                let position = crate::pixels::raster_to_position(&count, raster);
                let mut name = String::with_capacity(self.pattern.len());
                let mut last = 0;
                for ((block, &(s, e)), &p) in self.blocks.iter().zip(&self.spans).zip(&position) {
                    name.push_str(&self.pattern[last..s]);
                    name.push_str(&block.elements[p]);
                    last = e;
                }
                name.push_str(&self.pattern[last..]);
                PathBuf::from(name)
            })
            .collect()
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn blocks(&self) -> &[PatternBlock] {
        &self.blocks
    }

    /// Files named by the pattern, first block fastest
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Elements per block
    pub fn count(&self) -> Vec<usize> {
        self.blocks.iter().map(|b| b.elements.len()).collect()
    }

    /// Literal text before block `i`, after the previous block or the last
    /// path separator
    pub fn prefix(&self, i: usize) -> &str {
        let Some(&(start, _)) = self.spans.get(i) else {
            return "";
        };
        let from = if i == 0 {
            self.pattern[..start].rfind(MAIN_SEPARATOR).map_or(0, |p| p + 1)
        } else {
            self.spans[i - 1].1
        };
        &self.pattern[from..start]
    }

    /// Text after the last block
    pub fn suffix(&self) -> &str {
        self.spans.last().map_or(&self.pattern[..], |&(_, e)| &self.pattern[e..])
    }

    /// Pattern matching `path` and its numbered siblings in the same directory
    ///
    /// Returns `None` when the siblings do not form regular sequences.
    pub fn find_pattern(path: &Path) -> FormatResult<Option<String>> {
        let dir = match path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FormatError::GenericError(format!("Cannot group {:?}", path)))?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(n) = entry.file_name().to_str() {
                names.push(n.to_string());
            }
        }
        Ok(Self::find_pattern_in(name, &names).map(|p| {
            if path.parent().map_or(true, |d| d.as_os_str().is_empty()) {
                p
            } else {
                dir.join(p).to_string_lossy().into_owned()
            }
        }))
    }

    /// Pattern for `name` among `names` (bare file names of one directory)
    ///
    /// Each digit run of `name` is compared with the names that differ from
    /// it only in that run. Series blocks are kept literal so that every
    /// series forms its own dataset. A pattern is only returned when every
    /// file it names exists and every one of those files yields the same
    /// pattern, so a group is the same whichever member is opened.
    pub fn find_pattern_in(name: &str, names: &[String]) -> Option<String> {
        let pattern = complete_pattern(name, names)?;
        if pattern == name {
            return Some(pattern);
        }
        let fp = FilePattern::new(&pattern).ok()?;
        for member in fp.files() {
            let member = member.to_string_lossy();
            if member != name && complete_pattern(&member, names).as_deref() != Some(pattern.as_str()) {
                debug!("{} and {} do not group the same way", name, member);
                return None;
            }
        }
        Some(pattern)
    }
}

/// Pattern for `name` whose files all appear in `names`
///
/// Blocks are made literal from the last one backwards until the pattern
/// names no missing file.
fn complete_pattern(name: &str, names: &[String]) -> Option<String> {
    let runs = digit_runs(name);
    let mut blocks: Vec<Option<String>> = Vec::with_capacity(runs.len());
    let mut last = 0;
    for &(start, end) in &runs {
        let literal = &name[last..start];
        last = end;
        if Axis::from_prefix(literal) == Axis::S {
            blocks.push(None);
            continue;
        }
        let (pre, post) = (&name[..start], &name[end..]);
        let siblings: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|n| {
                n.len() > pre.len() + post.len()
                    && n.starts_with(pre)
                    && n.ends_with(post)
                    && n[pre.len()..n.len() - post.len()].bytes().all(|b| b.is_ascii_digit())
            })
            .collect();
        if siblings.len() <= 1 {
            blocks.push(None);
            continue;
        }
        let fixed = siblings.iter().all(|n| n.len() == name.len());
        let mut numbers = Vec::with_capacity(siblings.len());
        for n in &siblings {
            numbers.push(n[pre.len()..n.len() - post.len()].parse::<u64>().ok()?);
        }
        numbers.sort_unstable();
        match bounds(&numbers, if fixed { end - start } else { 0 }) {
            Some(b) => blocks.push(Some(b)),
            None => {
                debug!("Numbers around {} do not form a sequence", name);
                return None;
            }
        }
    }

    let present: HashSet<&str> = names.iter().map(String::as_str).collect();
    loop {
        let pattern = assemble(name, &runs, &blocks);
        let complete = FilePattern::new(&pattern).map_or(false, |fp| {
            fp.files()
                .iter()
                .all(|f| f.to_str().map_or(false, |f| present.contains(f)))
        });
        if complete {
            return Some(pattern);
        }
        match blocks.iter().rposition(Option::is_some) {
            Some(i) => blocks[i] = None,
            None => return Some(name.to_string()),
        }
    }
}

/// `name` with each digit run replaced by its block, if any
fn assemble(name: &str, runs: &[(usize, usize)], blocks: &[Option<String>]) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last = 0;
    for (&(start, end), block) in runs.iter().zip(blocks) {
        out.push_str(&name[last..start]);
        out.push_str(block.as_deref().unwrap_or(&name[start..end]));
        last = end;
    }
    out.push_str(&name[last..]);
    out
}

/// Byte ranges of every run of ASCII digits
fn digit_runs(name: &str) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, b) in name.bytes().enumerate() {
        match (b.is_ascii_digit(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, name.len()));
    }
    runs
}

/// `<first-last:step>` for an evenly spaced sorted sequence
fn bounds(numbers: &[u64], width: usize) -> Option<String> {
    if numbers.len() < 2 {
        return None;
    }
    let step = numbers[1] - numbers[0];
    if step == 0 || numbers.windows(2).any(|w| w[1] - w[0] != step) {
        return None;
    }
    let (first, last) = (numbers[0], numbers[numbers.len() - 1]);
    let mut block = format!("<{:0w$}-{:0w$}", first, last, w = width);
    if step != 1 {
        block.push_str(&format!(":{}", step));
    }
    block.push('>');
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_expand_ranges_and_lists() {
        let fp = FilePattern::new("img_z<1-3>_<red,green>.tif").unwrap();
        assert_eq!(fp.count(), vec![3, 2]);
        let files: Vec<String> = fp.files().iter().map(|p| p.to_string_lossy().into_owned()).collect();
        assert_eq!(
            files,
            vec![
                "img_z1_red.tif",
                "img_z2_red.tif",
                "img_z3_red.tif",
                "img_z1_green.tif",
                "img_z2_green.tif",
                "img_z3_green.tif",
            ]
        );
        assert_eq!(fp.prefix(0), "img_z");
        assert_eq!(fp.prefix(1), "_");
        assert_eq!(fp.suffix(), ".tif");
    }

    #[test]
    fn test_padding_and_steps() {
        let fp = FilePattern::new("t<008-012:2>.tif").unwrap();
        assert_eq!(fp.blocks()[0].elements(), &["008", "010", "012"]);
        let fp = FilePattern::new("t<8-12:2>.tif").unwrap();
        assert_eq!(fp.blocks()[0].elements(), &["8", "10", "12"]);
        let fp = FilePattern::new("well<A-C>.tif").unwrap();
        assert_eq!(fp.blocks()[0].elements(), &["A", "B", "C"]);
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(FilePattern::new("a<1-3.tif").is_err());
        assert!(FilePattern::new("a1-3>.tif").is_err());
        assert!(FilePattern::new("a<<1-3>>.tif").is_err());
        assert!(FilePattern::new("a<5-3>.tif").is_err());
        assert!(FilePattern::new("a<>.tif").is_err());
        let plain = FilePattern::new("plain.tif").unwrap();
        assert_eq!(plain.files(), &[PathBuf::from("plain.tif")]);
    }

    #[test]
    fn test_find_pattern_per_axis() {
        let dir = names(&[
            "cell_z1_t1.tif",
            "cell_z2_t1.tif",
            "cell_z3_t1.tif",
            "cell_z1_t2.tif",
            "cell_z2_t2.tif",
            "cell_z3_t2.tif",
            "notes.txt",
        ]);
        for name in &dir[..6] {
            assert_eq!(
                FilePattern::find_pattern_in(name, &dir).as_deref(),
                Some("cell_z<1-3>_t<1-2>.tif")
            );
        }
    }

    #[test]
    fn test_find_pattern_fixed_width() {
        let dir = names(&["f008.tif", "f009.tif", "f010.tif", "f011.tif"]);
        assert_eq!(FilePattern::find_pattern_in("f010.tif", &dir).as_deref(), Some("f<008-011>.tif"));
        let dir = names(&["f8.tif", "f10.tif", "f12.tif"]);
        assert_eq!(FilePattern::find_pattern_in("f8.tif", &dir).as_deref(), Some("f<8-12:2>.tif"));
    }

    #[test]
    fn test_find_pattern_irregular_or_alone() {
        let dir = names(&["a1.tif", "a2.tif", "a7.tif"]);
        assert_eq!(FilePattern::find_pattern_in("a1.tif", &dir), None);
        let dir = names(&["solo5.tif", "other.tif"]);
        assert_eq!(FilePattern::find_pattern_in("solo5.tif", &dir).as_deref(), Some("solo5.tif"));
    }

    #[test]
    fn test_incomplete_grid_groups_the_same_from_every_member() {
        let dir = names(&["c_z1_t1.tif", "c_z2_t1.tif", "c_z3_t1.tif", "c_z1_t2.tif", "c_z2_t2.tif"]);
        for name in &dir[..3] {
            assert_eq!(
                FilePattern::find_pattern_in(name, &dir).as_deref(),
                Some("c_z<1-3>_t1.tif"),
                "entry point {}",
                name
            );
        }
        for name in &dir[3..] {
            assert_eq!(FilePattern::find_pattern_in(name, &dir), None, "entry point {}", name);
        }
    }

    #[test]
    fn test_series_blocks_stay_literal() {
        let dir = names(&["plate_s1_t1.tif", "plate_s1_t2.tif", "plate_s2_t1.tif", "plate_s2_t2.tif"]);
        assert_eq!(
            FilePattern::find_pattern_in("plate_s2_t1.tif", &dir).as_deref(),
            Some("plate_s2_t<1-2>.tif")
        );
    }
}
