//! External service integrations.

pub mod sessions;

pub use sessions::{SessionVerifier, StaticSessionVerifier};
