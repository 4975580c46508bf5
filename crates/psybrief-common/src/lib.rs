//! psybrief-common — Closed vocabularies shared across all psybrief crates.

pub mod taxonomy;

pub use taxonomy::{Category, StudyType, UnknownLabel};
