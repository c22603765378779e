//! Embedding provider implementations.

pub mod hashed;
pub mod remote;

pub use hashed::{hashed_embedding, HashedProvider};
pub use remote::RemoteProvider;
