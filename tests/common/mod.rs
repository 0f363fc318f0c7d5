pub mod fixtures;
pub mod setup;
