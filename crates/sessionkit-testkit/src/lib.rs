//! # sessionkit testkit
//!
//! Testing utilities for sessionkit.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Known vectors**: EVM hashing, selector and address vectors
//! - **Generators**: Proptest strategies for grants, descriptors and chain ids
//! - **Fixtures**: A chain, store, owner and kit wired together
//!
//! The end-to-end lifecycle scenarios live in `tests/`.
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sessionkit_testkit::generators::{grant_from_params, GrantParams};
//!
//! proptest! {
//!     #[test]
//!     fn grants_verify(params: GrantParams) {
//!         prop_assert!(grant_from_params(&params).verify().is_ok());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use sessionkit_testkit::fixtures::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let (account, grant) = fixture.granted_two().await.unwrap();
//!     # let _ = (account, grant);
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{fast_config, TestFixture};
pub use generators::{grant_from_params, GrantParams};
pub use vectors::{address_vectors, selector_vectors, verify_all_vectors};
