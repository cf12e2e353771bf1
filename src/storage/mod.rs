pub mod engine;
pub mod memory;

pub use engine::{Filter, MetadataStore, OrderBy, SortDirection};
pub use memory::InMemoryMetaStore;
