//! Fleet backend client helpers.

/// Backend client and the pipeline-facing trait.
pub mod client;
/// Error taxonomy for backend calls.
pub mod error;
/// Recording client for tests.
#[cfg(test)]
pub mod mock;
/// Token persistence per backend.
pub mod token_store;
/// Wire types for the signed-upload handshake.
pub mod types;
