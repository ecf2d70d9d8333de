//! Mosaic Test - Shared test doubles for the mosaic runtime.
//!
//! In-memory implementations of every host collaborator, so the runtime's
//! scheduling can be exercised without a browser:
//!
//! - [`MemoryDocument`]: a small node arena with structural paths
//! - [`MemoryGlobal`]: the shared global object
//! - [`MockSandboxProvider`]: proxy, legacy and snapshot sandboxes
//! - [`MockEntryFetcher`]: scripted entries with fetch/exec counters
//! - [`MockRouter`]: a miniature route-driven lifecycle driver
//! - [`TestHarness`]: all of the above wired to a `MicroFrontend`
//!
//! # Usage
//!
//! ```rust,ignore
//! use mosaic_test::prelude::*;
//!
//! #[tokio::test]
//! async fn test_mounts() {
//!     let harness = TestHarness::new();
//!     harness.container("c1");
//!     harness.fetcher.register("//a.test", MockEntry::recording("a", &harness.log));
//!
//!     let frontend = harness.frontend();
//!     let handle = frontend
//!         .load_micro_app(test_app("a", "c1"), None, LifecycleHooks::new())
//!         .unwrap();
//!     handle.mount_promise().await.unwrap();
//!     assert!(harness.log.contains("a:mount"));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod document;
pub mod fixtures;
pub mod harness;
pub mod mocks;
pub mod router;

pub use document::*;
pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
pub use router::*;
