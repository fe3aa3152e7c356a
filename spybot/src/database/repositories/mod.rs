//! Repository layer for database access.

pub mod state;

pub use state::{SqlxStateRepository, StateRepository};
