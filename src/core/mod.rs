pub mod error;
pub mod types;

pub use error::{MetaError, Result};
pub use types::{MetaTable, Record, ScopeIds, generate_id};
