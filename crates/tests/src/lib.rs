//! Integration Tests for the Marketgate read gateway
//!
//! This crate contains various test modules:
//!
//! - `selector_tests`: Endpoint probing, failover ordering and selection caching
//! - `contract_reader_tests`: ABI decoding of contract reads against a mock endpoint
//! - `gateway_tests`: End-to-end request flows through `MarketGateway`
//! - `config_tests`: Layered configuration and deployment variable overrides
//! - `mock_infrastructure`: Reusable mock types for testing
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod config_tests;

#[cfg(test)]
mod contract_reader_tests;

#[cfg(test)]
mod gateway_tests;

#[cfg(test)]
mod selector_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
