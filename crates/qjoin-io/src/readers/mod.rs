//! Readers that materialize a whole relation as a `Table`.
//!
//! Relations handed to the optimizer are small enough to sample in memory;
//! there is no streaming here.

pub mod csv;
