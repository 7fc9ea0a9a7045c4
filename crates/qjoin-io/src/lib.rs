#![forbid(unsafe_code)]
//! qjoin-io: concrete relation storage for the optimizer and executor.
//!
//! - `MemoryStore`: rows + index definitions, implements
//!   `qjoin_core::store::RelationStore` and hands out immutable catalog
//!   snapshots.
//! - `readers::csv`: load a relation from CSV with inferred column types.

pub mod memory_store;
pub mod readers;

pub use memory_store::MemoryStore;
pub use readers::csv::{read_csv_path, read_csv_reader};
