//! In-process doubles for the driver's external collaborators
//!
//! Nothing here talks to a KDC or mounts anything; the fakes record what
//! they were asked to do so tests can assert on it.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testkit::TestDriver;
//!
//! #[tokio::test]
//! async fn test_mount() {
//!     let t = TestDriver::new().await;
//!     t.driver.create("v1", &t.source("data")).await.unwrap();
//!     let mountpoint = t.driver.mount("v1", "alice").await.unwrap();
//!     assert_eq!(t.tool.mount_calls(), 1);
//! }
//! ```
mod auth;
mod clock;
mod driver;
mod mount_tool;

pub use auth::{FakeAuthenticator, StaticUserResolver};
pub use clock::ManualClock;
pub use driver::{TestDriver, TEST_TICKET_LIFETIME};
pub use mount_tool::{FakeMountTool, MountRecord};
