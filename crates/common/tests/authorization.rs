//! Integration tests for credential and authorization gating of mounts

mod common;

use std::sync::Arc;

use ::common::auth::AllowAnyPolicy;
use ::common::credential::AuthenticationError;
use ::common::driver::DriverError;
use ::common::testkit::TestDriver;

#[tokio::test]
async fn test_bad_keytab_blocks_mounts_until_login() {
    let t = TestDriver::logged_out(Arc::new(AllowAnyPolicy));
    t.authenticator.deny_keytab("badkeytab");
    t.driver.create("v1", &t.source("data")).await.unwrap();

    let err = t.credentials.login("svc", "badkeytab").await.unwrap_err();
    assert!(matches!(err, AuthenticationError::Rejected { .. }));

    for caller in ["alice", "bob"] {
        let err = t.driver.mount("v1", caller).await.unwrap_err();
        assert!(matches!(err, DriverError::Authentication(_)));
    }
    assert_eq!(t.tool.mount_calls(), 0);

    t.credentials.login("svc", "/etc/svc.keytab").await.unwrap();
    t.driver.mount("v1", "alice").await.unwrap();
}

#[tokio::test]
async fn test_expiry_blocks_new_mounts_not_unmounts() {
    let t = common::setup_with_volume().await;
    t.driver.mount("v1", "alice").await.unwrap();
    t.expire_credential();

    let err = t.driver.mount("v1", "bob").await.unwrap_err();
    assert!(matches!(err, DriverError::Authentication(_)));
    assert_eq!(t.driver.get("v1").await.unwrap().refcount, 1);

    t.driver.unmount("v1", "alice").await.unwrap();
    assert_eq!(t.tool.unmount_calls(), 1);
}

#[tokio::test]
async fn test_renewal_keeps_mounts_available() {
    let t = common::setup_with_volume().await;
    let lifetime = ::common::testkit::TEST_TICKET_LIFETIME;

    for _ in 0..3 {
        t.clock.advance(lifetime - std::time::Duration::from_secs(30 * 60));
        t.credentials.renew_if_needed().await.unwrap();
        t.driver.mount("v1", "alice").await.unwrap();
    }
    assert_eq!(t.authenticator.renew_calls(), 3);
    assert_eq!(t.driver.get("v1").await.unwrap().refcount, 3);
}

#[tokio::test]
async fn test_unknown_caller_denied() {
    let t = common::setup_with_volume().await;
    let err = t.driver.mount("v1", "mallory").await.unwrap_err();
    assert_eq!(err, DriverError::Authorization("unknown user".to_string()));
}

#[tokio::test]
async fn test_owner_policy() {
    let t = common::setup_owner_only().await;
    let mut opts = t.source("home/alice");
    opts.insert("owner".to_string(), "alice".to_string());
    t.driver.create("alice-home", &opts).await.unwrap();

    let err = t.driver.mount("alice-home", "bob").await.unwrap_err();
    assert!(matches!(err, DriverError::Authorization(_)));
    t.driver.mount("alice-home", "alice").await.unwrap();
    assert_eq!(t.tool.mount_calls(), 1);
}

#[tokio::test]
async fn test_allow_list_policy() {
    let t = common::setup_allow_list(&["bob"]).await;
    t.driver.create("v1", &t.source("data")).await.unwrap();

    assert!(matches!(
        t.driver.mount("v1", "alice").await,
        Err(DriverError::Authorization(_))
    ));
    t.driver.mount("v1", "bob").await.unwrap();
}

#[tokio::test]
async fn test_error_messages_do_not_leak_keytab() {
    let t = TestDriver::logged_out(Arc::new(AllowAnyPolicy));
    t.driver.create("v1", &t.source("data")).await.unwrap();

    let err = t.driver.mount("v1", "alice").await.unwrap_err();
    let message = err.to_string();
    assert!(!message.contains("keytab"));
    assert!(!message.contains("svc"));
}
