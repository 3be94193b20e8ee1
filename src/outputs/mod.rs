//! Output generation.
//!
//! - [`json`]: writes each week's [`WeekBatch`](crate::models::WeekBatch) to a dated JSON file

pub mod json;
