//! Sink and source traits for index-addressed metadata
//!
//! Parsers push properties into a `MetadataStore` while a dataset is
//! opened; writers and the CLI read them back through `MetadataRetrieve`.

use crate::errors::FormatResult;
use super::path::{parse_node_list, MetaPath, NodeStep};
use super::value::MetaValue;

/// Write side of the metadata bridge
pub trait MetadataStore: Send {
    fn set_value(&mut self, path: &MetaPath, value: MetaValue) -> FormatResult<()>;

    /// Drops everything stored so far and accepts writes again
    fn reset(&mut self) {}

    /// Makes the store read-only
    fn freeze(&mut self) {}

    fn is_frozen(&self) -> bool {
        false
    }

    /// Read access, for stores that keep what they are given
    fn as_retrieve(&self) -> Option<&dyn MetadataRetrieve> {
        None
    }
}

/// Read side of the metadata bridge
pub trait MetadataRetrieve: Send {
    fn get_value(&self, path: &MetaPath) -> Option<MetaValue>;

    /// Number of `node` entries under `parents`
    fn node_count(&self, parents: &[NodeStep], node: &str) -> usize;

    /// Every stored property in document order
    fn entries(&self) -> Vec<(MetaPath, MetaValue)> {
        Vec::new()
    }
}

/// Replays every property of `source` into `target`
pub fn copy_metadata(source: &dyn MetadataRetrieve, target: &mut dyn MetadataStore) -> FormatResult<()> {
    for (path, value) in source.entries() {
        target.set_value(&path, value)?;
    }
    Ok(())
}

/// String-path helpers for any store
pub trait StoreExt: MetadataStore {
    fn set(&mut self, path: &str, value: impl Into<MetaValue>) -> FormatResult<()> {
        self.set_value(&MetaPath::parse(path)?, value.into())
    }
}

impl<T: MetadataStore + ?Sized> StoreExt for T {}

/// String-path helpers for any retrieve
pub trait RetrieveExt: MetadataRetrieve {
    fn get(&self, path: &str) -> Option<MetaValue> {
        MetaPath::parse(path).ok().and_then(|p| self.get_value(&p))
    }

    fn get_int(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(|v| v.as_int())
    }

    fn get_text(&self, path: &str) -> Option<String> {
        self.get(path).map(|v| v.to_string())
    }

    /// Counts the nodes named by a list path such as `Image[0]/Pixels/Plane`
    fn count(&self, path: &str) -> usize {
        parse_node_list(path)
            .map(|(parents, node)| self.node_count(&parents, &node))
            .unwrap_or(0)
    }
}

impl<T: MetadataRetrieve + ?Sized> RetrieveExt for T {}
