//! OME-style metadata tree
//!
//! Nodes hold their properties and ordered child lists. Writing to an
//! index past the end of a list grows the list with empty nodes.

use std::collections::BTreeMap;
use std::io::Cursor;
use log::trace;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::errors::{FormatError, FormatResult};
use super::path::{MetaPath, NodeStep};
use super::store::{MetadataRetrieve, MetadataStore};
use super::value::MetaValue;
use super::vocabulary::{Vocabulary, ROOT};

const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";

#[derive(Debug, Clone, Default, PartialEq)]
struct Node {
    properties: BTreeMap<String, MetaValue>,
    children: BTreeMap<String, Vec<Node>>,
}

impl Node {
    fn child(&self, step: &NodeStep) -> Option<&Node> {
        self.children.get(&step.0).and_then(|list| list.get(step.1))
    }

    fn child_mut(&mut self, step: &NodeStep) -> &mut Node {
        let list = self.children.entry(step.0.clone()).or_default();
        if list.len() <= step.1 {
            list.resize_with(step.1 + 1, Node::default);
        }
        &mut list[step.1]
    }
}

/// In-memory metadata tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OmeMetadata {
    root: Node,
    frozen: bool,
}

impl OmeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(node: &Node, steps: &mut Vec<NodeStep>, out: &mut Vec<(MetaPath, MetaValue)>) {
        for (key, value) in &node.properties {
            out.push((MetaPath::from_parts(steps.clone(), key), value.clone()));
        }
        for (name, list) in &node.children {
            for (index, child) in list.iter().enumerate() {
                steps.push((name.clone(), index));
                Self::collect(child, steps, out);
                steps.pop();
            }
        }
    }

    fn node(&self, steps: &[NodeStep]) -> Option<&Node> {
        steps.iter().try_fold(&self.root, |node, step| node.child(step))
    }

    /// Serializes the tree as an OME-XML document
    pub fn to_xml(&self) -> FormatResult<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut ome = BytesStart::new("OME");
        ome.push_attribute(("xmlns", OME_NAMESPACE));
        emit(&mut writer, Event::Start(ome))?;
        self.write_children(&mut writer, ROOT, &self.root, "")?;
        emit(&mut writer, Event::End(BytesEnd::new("OME")))?;

        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| FormatError::GenericError(format!("XML is not UTF-8: {}", e)))
    }

    fn write_children(
        &self,
        writer: &mut Writer<Cursor<Vec<u8>>>,
        name: &str,
        node: &Node,
        id_prefix: &str,
    ) -> FormatResult<()> {
        let vocabulary = Vocabulary::global();
        // vocabulary order keeps the output stable
        for child_name in vocabulary.children(name) {
            let Some(list) = node.children.get(child_name) else {
                continue;
            };
            for (index, child) in list.iter().enumerate() {
                let id = if id_prefix.is_empty() {
                    format!("{}:{}", child_name, index)
                } else {
                    format!("{}:{}", id_prefix, index)
                };
                let mut start = BytesStart::new(child_name.as_str());
                if !child.properties.contains_key("ID") && vocabulary.has_property(child_name, "ID") {
                    start.push_attribute(("ID", id.as_str()));
                }
                for (key, value) in &child.properties {
                    start.push_attribute((key.as_str(), value.to_string().as_str()));
                }
                if child.children.is_empty() {
                    emit(writer, Event::Empty(start))?;
                } else {
                    emit(writer, Event::Start(start))?;
                    self.write_children(writer, child_name, child, &id)?;
                    emit(writer, Event::End(BytesEnd::new(child_name.as_str())))?;
                }
            }
        }
        Ok(())
    }
}

fn emit(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> FormatResult<()> {
    writer
        .write_event(event)
        .map_err(|e| FormatError::GenericError(format!("XML write failed: {}", e)))
}

impl MetadataStore for OmeMetadata {
    fn set_value(&mut self, path: &MetaPath, value: MetaValue) -> FormatResult<()> {
        if self.frozen {
            return Err(FormatError::Unsupported(format!(
                "metadata is read-only after open; cannot set {}",
                path
            )));
        }
        trace!("{} = {}", path, value);
        let node = path
            .nodes()
            .iter()
            .fold(&mut self.root, |node, step| node.child_mut(step));
        node.properties.insert(path.property().to_string(), value);
        Ok(())
    }

    fn reset(&mut self) {
        self.root = Node::default();
        self.frozen = false;
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn as_retrieve(&self) -> Option<&dyn MetadataRetrieve> {
        Some(self)
    }
}

impl MetadataRetrieve for OmeMetadata {
    fn get_value(&self, path: &MetaPath) -> Option<MetaValue> {
        self.node(path.nodes())?.properties.get(path.property()).cloned()
    }

    fn node_count(&self, parents: &[NodeStep], node: &str) -> usize {
        self.node(parents)
            .and_then(|n| n.children.get(node))
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn entries(&self) -> Vec<(MetaPath, MetaValue)> {
        let mut out = Vec::new();
        Self::collect(&self.root, &mut Vec::new(), &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::store::{RetrieveExt, StoreExt};

    #[test]
    fn test_set_get_and_count() {
        let mut meta = OmeMetadata::new();
        meta.set("Image[0]/Pixels/SizeX", 512u32).unwrap();
        meta.set("Image[1]/Name", "second").unwrap();
        meta.set("Image[0]/Pixels/Plane[4]/TheZ", 2usize).unwrap();

        assert_eq!(meta.get_int("Image[0]/Pixels/SizeX"), Some(512));
        assert_eq!(meta.get_text("Image[1]/Name").as_deref(), Some("second"));
        assert_eq!(meta.count("Image"), 2);
        assert_eq!(meta.count("Image[0]/Pixels/Plane"), 5);
        assert_eq!(meta.count("Image[1]/Pixels/Plane"), 0);
        assert!(meta.get("Image[0]/Pixels/Plane[1]/TheZ").is_none());
    }

    #[test]
    fn test_entries_replay_into_another_store() {
        let mut meta = OmeMetadata::new();
        meta.set("Image[0]/Name", "a").unwrap();
        meta.set("Image[1]/Pixels/Plane[2]/TheT", 3usize).unwrap();
        let mut copy = OmeMetadata::new();
        crate::meta::store::copy_metadata(&meta, &mut copy).unwrap();
        assert_eq!(copy.get_text("Image[0]/Name").as_deref(), Some("a"));
        assert_eq!(copy.get_int("Image[1]/Pixels/Plane[2]/TheT"), Some(3));
        assert_eq!(copy.entries().len(), 2);
    }

    #[test]
    fn test_frozen_store_rejects_writes() {
        let mut meta = OmeMetadata::new();
        meta.set("Image[0]/Name", "a").unwrap();
        meta.freeze();
        assert!(meta.set("Image[0]/Name", "b").is_err());
        assert_eq!(meta.get_text("Image[0]/Name").as_deref(), Some("a"));
        meta.reset();
        assert!(!meta.is_frozen());
        assert_eq!(meta.count("Image"), 0);
    }

    #[test]
    fn test_xml_dump() {
        let mut meta = OmeMetadata::new();
        meta.set("Image[0]/Name", "cells & nuclei").unwrap();
        meta.set("Image[0]/Pixels/SizeX", 4u32).unwrap();
        meta.set("Instrument[0]/Detector[0]/Gain", 1.5).unwrap();
        let xml = meta.to_xml().unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<Image ID=\"Image:0\" Name=\"cells &amp; nuclei\">"));
        assert!(xml.contains("<Pixels ID=\"Image:0:0\" SizeX=\"4\"/>"));
        assert!(xml.contains("<Detector ID=\"Instrument:0:0\" Gain=\"1.5\"/>"));
        assert!(xml.trim_end().ends_with("</OME>"));
    }
}
