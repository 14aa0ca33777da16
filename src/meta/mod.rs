//! Metadata store and retrieve bridge
//!
//! Readers push index-addressed properties into a [`MetadataStore`] while
//! a dataset is opened. The default store is an [`OmeMetadata`] tree that
//! can be read back and dumped as XML.

pub mod ome;
pub mod path;
pub mod populate;
pub mod store;
pub mod value;
pub mod vocabulary;
pub mod wrappers;

pub use ome::OmeMetadata;
pub use path::MetaPath;
pub use populate::populate_pixels;
pub use store::{copy_metadata, MetadataRetrieve, MetadataStore, RetrieveExt, StoreExt};
pub use value::MetaValue;
pub use wrappers::{AggregateMetadata, DummyMetadata, FilterMetadata};
