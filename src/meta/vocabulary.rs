//! Fixed node and property vocabulary of the metadata tree
//!
//! The vocabulary ships with the crate as `ome_vocabulary.toml` and is
//! parsed once on first use.

use std::collections::{HashMap, HashSet};
use lazy_static::lazy_static;
use log::warn;

use crate::errors::{FormatError, FormatResult};

lazy_static! {
    static ref VOCABULARY: Vocabulary = {
        let content = include_str!("../../ome_vocabulary.toml");
        Vocabulary::from_str(content).unwrap_or_else(|e| {
            warn!("Failed to parse metadata vocabulary: {}", e);
            Vocabulary::default()
        })
    };
}

/// Name of the document level in the vocabulary tables
pub const ROOT: &str = "root";

/// Allowed nodes and properties
#[derive(Debug, Default)]
pub struct Vocabulary {
    children: HashMap<String, Vec<String>>,
    single: HashSet<String>,
    properties: HashMap<String, HashSet<String>>,
}

impl Vocabulary {
    /// Parse a vocabulary from a TOML string
    pub fn from_str(content: &str) -> FormatResult<Self> {
        let toml_value: toml::Value = content
            .parse()
            .map_err(|e| FormatError::GenericError(format!("Failed to parse TOML: {}", e)))?;

        let mut vocabulary = Vocabulary::default();
        if let Some(table) = toml_value.get("nodes").and_then(|v| v.as_table()) {
            for (parent, list) in table {
                vocabulary.children.insert(parent.clone(), Self::string_list(list));
            }
        }
        if let Some(list) = toml_value.get("single").and_then(|v| v.get("names")) {
            vocabulary.single = Self::string_list(list).into_iter().collect();
        }
        if let Some(table) = toml_value.get("properties").and_then(|v| v.as_table()) {
            for (node, list) in table {
                vocabulary
                    .properties
                    .insert(node.clone(), Self::string_list(list).into_iter().collect());
            }
        }
        Ok(vocabulary)
    }

    fn string_list(value: &toml::Value) -> Vec<String> {
        value
            .as_array()
            .map(|items| items.iter().filter_map(|v| v.as_str()).map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// The shared vocabulary
    pub fn global() -> &'static Vocabulary {
        &VOCABULARY
    }

    pub fn is_child(&self, parent: &str, node: &str) -> bool {
        self.children
            .get(parent)
            .map(|list| list.iter().any(|n| n == node))
            .unwrap_or(false)
    }

    /// Child node names of `parent` in document order
    pub fn children(&self, parent: &str) -> &[String] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_single(&self, node: &str) -> bool {
        self.single.contains(node)
    }

    pub fn has_property(&self, node: &str, property: &str) -> bool {
        self.properties
            .get(node)
            .map(|set| set.contains(property))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_vocabulary() {
        let v = Vocabulary::global();
        assert!(v.is_child(ROOT, "Image"));
        assert!(v.is_child("Pixels", "Plane"));
        assert!(!v.is_child("Image", "Plane"));
        assert!(v.is_single("Pixels"));
        assert!(v.has_property("Plane", "TheZ"));
        assert!(!v.has_property("Plane", "SizeX"));
        assert_eq!(v.children("Instrument").len(), 3);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(Vocabulary::from_str("[nodes").is_err());
    }
}
