//! # Extstore Testkit
//!
//! Testing utilities for extstore.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: memory-backed storage plus a tiny in-process server
//!   stand-in for exercising whole sync passes
//! - **Generators**: proptest strategies for the core record types
//!
//! ## Test Fixtures
//!
//! Quickly set up a sync scenario:
//!
//! ```rust
//! use extstore_testkit::TestFixture;
//!
//! # async fn example() {
//! let fixture = TestFixture::new();
//! let report = fixture
//!     .do_sync(vec![fixture.server_record("ext1", "payload")])
//!     .await
//!     .unwrap();
//! assert_eq!(report.take_remote, 1);
//! # }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use extstore_testkit::generators::staged_record;
//!
//! proptest! {
//!     #[test]
//!     fn staging_accepts_any_record(record in staged_record()) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::TestFixture;
