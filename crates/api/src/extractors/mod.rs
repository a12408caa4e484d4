//! Custom Axum extractors.

pub mod customer_auth;
pub mod device_auth;

pub use customer_auth::CustomerAuth;
pub use device_auth::DeviceAuth;
