//! Index-addressed paths into the metadata tree
//!
//! A path names a chain of nodes and ends in a property, for example
//! `Image[0]/Pixels/Plane[3]/TheZ` or `Instrument[1]/Detector[0]/Gain`.

use std::fmt;
use std::str::FromStr;
use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{FormatError, FormatResult};
use super::vocabulary::{Vocabulary, ROOT};

lazy_static! {
    static ref SEGMENT: Regex =
        Regex::new(r"^([A-Z][A-Za-z]*)(?:\[(\d+)\])?$").expect("segment pattern compiles");
}

/// A node step: element name and index among its siblings
pub type NodeStep = (String, usize);

/// Validated path to a property
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetaPath {
    nodes: Vec<NodeStep>,
    property: String,
}

fn invalid(path: &str, why: &str) -> FormatError {
    FormatError::GenericError(format!("Invalid metadata path '{}': {}", path, why))
}

/// Parses `Name[index]` node steps, checking them against the vocabulary
fn parse_steps(path: &str, segments: &[&str]) -> FormatResult<Vec<NodeStep>> {
    let vocabulary = Vocabulary::global();
    let mut parent = ROOT.to_string();
    let mut steps = Vec::with_capacity(segments.len());
    for segment in segments {
        let caps = SEGMENT
            .captures(segment)
            .ok_or_else(|| invalid(path, &format!("bad segment '{}'", segment)))?;
        let name = caps[1].to_string();
        if !vocabulary.is_child(&parent, &name) {
            return Err(invalid(path, &format!("'{}' cannot hold '{}'", parent, name)));
        }
        let index = match caps.get(2) {
            Some(m) => m
                .as_str()
                .parse::<usize>()
                .map_err(|_| invalid(path, "index out of range"))?,
            None if vocabulary.is_single(&name) => 0,
            None => return Err(invalid(path, &format!("'{}' needs an index", name))),
        };
        parent = name.clone();
        steps.push((name, index));
    }
    Ok(steps)
}

impl MetaPath {
    /// Parses and validates a property path
    pub fn parse(path: &str) -> FormatResult<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        let (property, node_segments) = match segments.split_last() {
            Some((last, rest)) if !rest.is_empty() => (*last, rest),
            _ => return Err(invalid(path, "expected at least one node and a property")),
        };
        let nodes = parse_steps(path, node_segments)?;
        let owner = nodes.last().map(|(n, _)| n.as_str()).unwrap_or(ROOT);
        if !Vocabulary::global().has_property(owner, property) {
            return Err(invalid(path, &format!("'{}' has no property '{}'", owner, property)));
        }
        Ok(MetaPath {
            nodes,
            property: property.to_string(),
        })
    }

    /// Builds a path from already validated parts
    pub fn from_parts(nodes: Vec<NodeStep>, property: &str) -> Self {
        MetaPath {
            nodes,
            property: property.to_string(),
        }
    }

    pub fn nodes(&self) -> &[NodeStep] {
        &self.nodes
    }

    pub fn property(&self) -> &str {
        &self.property
    }
}

impl FromStr for MetaPath {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetaPath::parse(s)
    }
}

impl fmt::Display for MetaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, index) in &self.nodes {
            if Vocabulary::global().is_single(name) {
                write!(f, "{}/", name)?;
            } else {
                write!(f, "{}[{}]/", name, index)?;
            }
        }
        f.write_str(&self.property)
    }
}

/// Parses a node list path such as `Image` or `Image[0]/Pixels/Plane`
///
/// Returns the parent steps and the listed node name.
pub fn parse_node_list(path: &str) -> FormatResult<(Vec<NodeStep>, String)> {
    let segments: Vec<&str> = path.split('/').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| invalid(path, "empty path"))?;
    let steps = parse_steps(path, parents)?;
    let parent = steps.last().map(|(n, _)| n.as_str()).unwrap_or(ROOT);
    if !Vocabulary::global().is_child(parent, last) {
        return Err(invalid(path, &format!("'{}' cannot hold '{}'", parent, last)));
    }
    Ok((steps, last.to_string()))
}
