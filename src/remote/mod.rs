//! Boundary to the remote store: the collaborator contract, the auth-gated
//! gateway the core calls through, and an in-memory implementation.

pub mod gateway;
pub mod mock;
pub mod remote_client;
