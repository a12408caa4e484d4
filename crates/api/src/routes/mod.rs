//! HTTP route handlers.

pub mod commands;
pub mod dispatch;
pub mod health;
