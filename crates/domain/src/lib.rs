//! Domain layer for the FleetQ backend.
//!
//! This crate contains:
//! - Domain models (Command, CommandStatus, ClaimedCommand)
//! - API request/response types with validation

pub mod models;
