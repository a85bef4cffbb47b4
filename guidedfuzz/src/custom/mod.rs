//! Ready-made implementations of the crate's seams.

pub mod random_source;
pub mod scripted;
