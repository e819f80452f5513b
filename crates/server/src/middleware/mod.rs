//! HTTP middleware components for the gateway server.
//!
//! Axum adapters over `marketgate_core::middleware`: the business logic (client identity,
//! validation, rate limiting) lives in the core crate, this module only bridges it to
//! request parts and headers.

pub mod client_identity;
pub mod correlation_id;

pub use client_identity::ClientIdentity;
pub use correlation_id::{create_request_id_layers, UuidRequestIdGenerator, X_REQUEST_ID};
