//! Gym discovery: the background search that feeds the progress manager

pub mod driver;
pub mod merge;

pub use driver::*;
pub use merge::merge_candidates;
