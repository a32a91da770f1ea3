//! Text utilities: keyword extraction, segmentation and fingerprints.

pub mod dedupe;
pub mod keywords;
pub mod segment;
