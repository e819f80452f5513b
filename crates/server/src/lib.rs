//! HTTP front end for the Marketgate read gateway.
//!
//! [`router::create_app`] mounts the gateway routes on axum with the request ID,
//! compression, timeout and concurrency layers. The binary in `main.rs` adds logging,
//! configuration loading and graceful shutdown.

pub mod middleware;
pub mod router;
