//! Storage abstractions implemented by adapter crates.

mod traits;

pub use traits::*;
