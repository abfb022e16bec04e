//! Test fixtures

mod fixtures;

pub use fixtures::{learning_note, observation, revisit_series};
