use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::auth::{UserIdentity, UserResolver};
use crate::clock::Clock;
use crate::credential::{AuthenticationError, Authenticator};

/// Issues tickets valid for a fixed lifetime from the current clock reading.
pub struct FakeAuthenticator {
    clock: Arc<dyn Clock>,
    lifetime: Duration,
    rejection: Mutex<Option<String>>,
    denied_keytabs: Mutex<HashSet<PathBuf>>,
    acquire_calls: AtomicUsize,
    renew_calls: AtomicUsize,
}

impl FakeAuthenticator {
    pub fn new(clock: Arc<dyn Clock>, lifetime: Duration) -> Self {
        Self {
            clock,
            lifetime,
            rejection: Mutex::new(None),
            denied_keytabs: Mutex::new(HashSet::new()),
            acquire_calls: AtomicUsize::new(0),
            renew_calls: AtomicUsize::new(0),
        }
    }

    /// Fail every request with `reason` until [`accept`](Self::accept).
    pub fn reject(&self, reason: &str) {
        *self.rejection.lock() = Some(reason.to_string());
    }

    pub fn accept(&self) {
        *self.rejection.lock() = None;
    }

    /// Fail requests that present `keytab`.
    pub fn deny_keytab(&self, keytab: impl Into<PathBuf>) {
        self.denied_keytabs.lock().insert(keytab.into());
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn renew_calls(&self) -> usize {
        self.renew_calls.load(Ordering::SeqCst)
    }

    fn issue(&self, principal: &str, keytab: &Path) -> Result<OffsetDateTime, AuthenticationError> {
        if let Some(reason) = self.rejection.lock().clone() {
            return Err(AuthenticationError::Rejected {
                principal: principal.to_string(),
                reason,
            });
        }
        if self.denied_keytabs.lock().contains(keytab) {
            return Err(AuthenticationError::Rejected {
                principal: principal.to_string(),
                reason: "key table entry not found".to_string(),
            });
        }
        Ok(self.clock.now() + self.lifetime)
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn acquire(
        &self,
        principal: &str,
        keytab: &Path,
    ) -> Result<OffsetDateTime, AuthenticationError> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        self.issue(principal, keytab)
    }

    async fn renew(
        &self,
        principal: &str,
        keytab: &Path,
    ) -> Result<OffsetDateTime, AuthenticationError> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        self.issue(principal, keytab)
    }
}

/// Resolves a fixed set of accounts. Uids are handed out from 1000 in the
/// order the names are given.
#[derive(Debug, Default)]
pub struct StaticUserResolver {
    users: HashMap<String, UserIdentity>,
}

impl StaticUserResolver {
    pub fn with_users(names: &[&str]) -> Self {
        let users = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let id = 1000 + i as u32;
                (
                    name.to_string(),
                    UserIdentity {
                        name: name.to_string(),
                        uid: id,
                        gid: id,
                        home: PathBuf::from("/home").join(name),
                    },
                )
            })
            .collect();
        Self { users }
    }
}

#[async_trait]
impl UserResolver for StaticUserResolver {
    async fn resolve(&self, username: &str) -> Option<UserIdentity> {
        self.users.get(username).cloned()
    }
}
