//! Core types for Millwright

mod department;
mod machine;
mod report;

pub use department::*;
pub use machine::*;
pub use report::*;
