//! Machine and maintenance records for Millwright
//!
//! SQLite backend; the schema is created on start-up.

pub mod repository;
pub mod traits;

pub use repository::MetadataStore;
pub use traits::*;
