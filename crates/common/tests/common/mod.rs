//! Shared setup for driver integration tests
#![allow(dead_code)]

use std::sync::Arc;

use ::common::auth::{AllowListPolicy, OwnerPolicy};
use ::common::testkit::TestDriver;

/// Driver with a live credential and the single volume `v1`.
pub async fn setup_with_volume() -> TestDriver {
    let t = TestDriver::new().await;
    t.driver.create("v1", &t.source("export/v1")).await.unwrap();
    t
}

/// Driver where only the volume's owner may mount.
pub async fn setup_owner_only() -> TestDriver {
    TestDriver::with_policy(Arc::new(OwnerPolicy)).await
}

/// Driver where only the listed users may mount.
pub async fn setup_allow_list(users: &[&str]) -> TestDriver {
    let entries = users.iter().map(|u| u.to_string()).collect::<Vec<_>>();
    TestDriver::with_policy(Arc::new(AllowListPolicy::new(entries))).await
}
