//! Device/user credential lifecycle

pub mod auth_manager;
pub mod prompt;
pub mod token_store;
