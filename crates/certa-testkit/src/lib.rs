//! # Certa Testkit
//!
//! Testing utilities for Certa.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a shared in-memory network and clients with their own
//!   working directories
//! - **Generators**: Proptest strategies for addresses, attributes and policies
//! - **Tracing**: a test subscriber honouring `RUST_LOG`
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use certa_testkit::{attrs, TestNetwork};
//!
//! async fn example() {
//!     let network = TestNetwork::new();
//!     let authority = network.client("registry", 0xaa).await;
//!     let alice = network.client("alice", 1).await;
//!
//!     authority.setup_authority(&attrs(&["member"])).await.unwrap();
//!     alice.request_attributes(&authority.address(), &attrs(&["member"])).await.unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use certa_testkit::generators::{attribute_pool, policy_over};
//!
//! proptest! {
//!     #[test]
//!     fn policy_reparses(policy in policy_over(attribute_pool(4))) {
//!         prop_assert_eq!(certa::AccessStructure::parse(&policy.to_string()).unwrap(), policy);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{attrs, identity, TestClient, TestNetwork};
pub use generators::{address, attribute, attribute_pool, policy_over};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a fmt subscriber writing through the test harness.
///
/// Filtered by `RUST_LOG`, defaulting to `warn`. Safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
