//! Stores that wrap or stand in for a real metadata tree

use log::debug;

use crate::errors::{FormatError, FormatResult};
use super::path::{MetaPath, NodeStep};
use super::store::{MetadataRetrieve, MetadataStore};
use super::value::MetaValue;

/// Accepts and discards every property
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyMetadata;

impl MetadataStore for DummyMetadata {
    fn set_value(&mut self, _path: &MetaPath, _value: MetaValue) -> FormatResult<()> {
        Ok(())
    }
}

/// Fans writes out to several stores and reads from the first that answers
#[derive(Default)]
pub struct AggregateMetadata {
    delegates: Vec<Box<dyn MetadataStore>>,
}

impl AggregateMetadata {
    pub fn new(delegates: Vec<Box<dyn MetadataStore>>) -> Self {
        AggregateMetadata { delegates }
    }

    pub fn add_delegate(&mut self, store: Box<dyn MetadataStore>) {
        self.delegates.push(store);
    }

    pub fn delegates(&self) -> &[Box<dyn MetadataStore>] {
        &self.delegates
    }
}

impl MetadataStore for AggregateMetadata {
    /// Succeeds when at least one delegate accepted the value
    fn set_value(&mut self, path: &MetaPath, value: MetaValue) -> FormatResult<()> {
        let mut last_error = None;
        let mut accepted = false;
        for delegate in &mut self.delegates {
            match delegate.set_value(path, value.clone()) {
                Ok(()) => accepted = true,
                Err(e) => {
                    debug!("Delegate rejected {}: {}", path, e);
                    last_error = Some(e);
                }
            }
        }
        match (accepted, last_error) {
            (false, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    fn reset(&mut self) {
        self.delegates.iter_mut().for_each(|d| d.reset());
    }

    fn freeze(&mut self) {
        self.delegates.iter_mut().for_each(|d| d.freeze());
    }

    fn is_frozen(&self) -> bool {
        !self.delegates.is_empty() && self.delegates.iter().all(|d| d.is_frozen())
    }

    fn as_retrieve(&self) -> Option<&dyn MetadataRetrieve> {
        Some(self)
    }
}

impl MetadataRetrieve for AggregateMetadata {
    fn get_value(&self, path: &MetaPath) -> Option<MetaValue> {
        self.delegates
            .iter()
            .filter_map(|d| d.as_retrieve())
            .find_map(|r| r.get_value(path))
    }

    fn node_count(&self, parents: &[NodeStep], node: &str) -> usize {
        self.delegates
            .iter()
            .filter_map(|d| d.as_retrieve())
            .map(|r| r.node_count(parents, node))
            .find(|&n| n > 0)
            .unwrap_or(0)
    }

    fn entries(&self) -> Vec<(MetaPath, MetaValue)> {
        self.delegates
            .iter()
            .filter_map(|d| d.as_retrieve())
            .map(|r| r.entries())
            .find(|e| !e.is_empty())
            .unwrap_or_default()
    }
}

/// Cleans text values before handing them to the wrapped store
///
/// Control characters are removed and surrounding whitespace trimmed.
/// Text that is empty after cleaning is not stored.
pub struct FilterMetadata {
    inner: Box<dyn MetadataStore>,
}

impl FilterMetadata {
    pub fn new(inner: Box<dyn MetadataStore>) -> Self {
        FilterMetadata { inner }
    }

    pub fn into_inner(self) -> Box<dyn MetadataStore> {
        self.inner
    }

    /// Sanitized form of a text value
    pub fn clean(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control())
            .collect::<String>()
            .trim()
            .to_string()
    }
}

impl MetadataStore for FilterMetadata {
    fn set_value(&mut self, path: &MetaPath, value: MetaValue) -> FormatResult<()> {
        let value = match value {
            MetaValue::Text(text) => {
                let cleaned = Self::clean(&text);
                if cleaned.is_empty() {
                    return Ok(());
                }
                MetaValue::Text(cleaned)
            }
            MetaValue::Float(v) if !v.is_finite() => {
                return Err(FormatError::GenericError(format!("non-finite value for {}", path)))
            }
            other => other,
        };
        self.inner.set_value(path, value)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn freeze(&mut self) {
        self.inner.freeze();
    }

    fn is_frozen(&self) -> bool {
        self.inner.is_frozen()
    }

    fn as_retrieve(&self) -> Option<&dyn MetadataRetrieve> {
        self.inner.as_retrieve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::ome::OmeMetadata;
    use crate::meta::store::{RetrieveExt, StoreExt};

    #[test]
    fn test_dummy_accepts_everything() {
        let mut dummy = DummyMetadata;
        assert!(dummy.set("Image[0]/Name", "x").is_ok());
        assert!(dummy.as_retrieve().is_none());
    }

    #[test]
    fn test_aggregate_broadcasts_and_reads_first_answer() {
        let mut first = OmeMetadata::new();
        first.set("Image[0]/Name", "from first").unwrap();
        let mut aggregate = AggregateMetadata::new(vec![Box::new(DummyMetadata), Box::new(first)]);
        aggregate.add_delegate(Box::new(OmeMetadata::new()));

        aggregate.set("Image[0]/Pixels/SizeX", 10u32).unwrap();
        assert_eq!(aggregate.get_text("Image[0]/Name").as_deref(), Some("from first"));
        assert_eq!(aggregate.get_int("Image[0]/Pixels/SizeX"), Some(10));
        let third = aggregate.delegates()[2].as_retrieve().unwrap();
        assert_eq!(third.get_int("Image[0]/Pixels/SizeX"), Some(10));
        assert_eq!(aggregate.count("Image"), 1);
    }

    #[test]
    fn test_aggregate_fails_only_when_every_delegate_fails() {
        let mut frozen = OmeMetadata::new();
        frozen.freeze();
        let mut aggregate = AggregateMetadata::new(vec![Box::new(frozen)]);
        assert!(aggregate.set("Image[0]/Name", "x").is_err());
        aggregate.add_delegate(Box::new(DummyMetadata));
        assert!(aggregate.set("Image[0]/Name", "x").is_ok());
    }

    #[test]
    fn test_filter_cleans_text() {
        let mut filter = FilterMetadata::new(Box::new(OmeMetadata::new()));
        filter.set("Image[0]/Name", "  stack\u{0}01\n ").unwrap();
        filter.set("Image[0]/Description", " \t ").unwrap();
        let retrieve = filter.as_retrieve().unwrap();
        assert_eq!(retrieve.get_text("Image[0]/Name").as_deref(), Some("stack01"));
        assert!(retrieve.get("Image[0]/Description").is_none());
        assert!(filter.set("Image[0]/Pixels/PhysicalSizeX", f64::NAN).is_err());
    }
}
