//! CSV input

pub mod loader;

pub use loader::{load_labeled, load_observations, read_labeled, read_observations, ObservationRecord};
