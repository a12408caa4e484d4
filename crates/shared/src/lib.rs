//! Shared utilities and common types for the FleetQ backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Cryptographic utilities (hashing, claim token generation)
//! - Cursor-based pagination
//! - Common validation logic

pub mod crypto;
pub mod pagination;
pub mod token;
pub mod validation;
