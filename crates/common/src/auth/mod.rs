//! Mount authorization
//!
//! Every mount is checked against three things, in order: a live Kerberos
//! credential, a caller that resolves to a local account, and the configured
//! [`AuthorizationPolicy`]. The first failing check decides the outcome.

mod policy;
mod user;

pub use policy::{AllowAnyPolicy, AllowListPolicy, AuthorizationPolicy, OwnerPolicy, PolicyKind};
pub use user::{SystemUserResolver, UserIdentity, UserResolver};

use std::sync::Arc;

use serde::Serialize;

use crate::credential::CredentialStore;
use crate::driver::Volume;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    CredentialUnavailable,
    UnknownUser,
    PolicyDenied,
}

/// Outcome of a single authorization check. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationDecision {
    pub caller: String,
    pub volume: String,
    pub allowed: bool,
    pub reason: Option<String>,
    pub denial: Option<DenialKind>,
}

impl AuthorizationDecision {
    fn allow(caller: &str, volume: &Volume) -> Self {
        Self {
            caller: caller.to_string(),
            volume: volume.name.clone(),
            allowed: true,
            reason: None,
            denial: None,
        }
    }

    fn deny(caller: &str, volume: &Volume, kind: DenialKind, reason: impl Into<String>) -> Self {
        Self {
            caller: caller.to_string(),
            volume: volume.name.clone(),
            allowed: false,
            reason: Some(reason.into()),
            denial: Some(kind),
        }
    }
}

pub struct Authorizer {
    credentials: Arc<CredentialStore>,
    users: Arc<dyn UserResolver>,
    policy: Arc<dyn AuthorizationPolicy>,
}

impl Authorizer {
    pub fn new(
        credentials: Arc<CredentialStore>,
        users: Arc<dyn UserResolver>,
        policy: Arc<dyn AuthorizationPolicy>,
    ) -> Self {
        Self {
            credentials,
            users,
            policy,
        }
    }

    pub async fn authorize(&self, caller: &str, volume: &Volume) -> AuthorizationDecision {
        let decision = self.decide(caller, volume).await;
        if decision.allowed {
            tracing::debug!(caller, volume = %volume.name, "mount authorized");
        } else {
            tracing::debug!(
                caller,
                volume = %volume.name,
                denial = ?decision.denial,
                reason = decision.reason.as_deref().unwrap_or_default(),
                "mount denied"
            );
        }
        decision
    }

    async fn decide(&self, caller: &str, volume: &Volume) -> AuthorizationDecision {
        if !self.credentials.is_valid() {
            return AuthorizationDecision::deny(
                caller,
                volume,
                DenialKind::CredentialUnavailable,
                "no valid kerberos credential",
            );
        }

        let user = match self.users.resolve(caller).await {
            Some(user) => user,
            None => {
                return AuthorizationDecision::deny(
                    caller,
                    volume,
                    DenialKind::UnknownUser,
                    "unknown user",
                )
            }
        };

        match self.policy.evaluate(&user, volume) {
            Ok(()) => AuthorizationDecision::allow(caller, volume),
            Err(reason) => {
                AuthorizationDecision::deny(caller, volume, DenialKind::PolicyDenied, reason)
            }
        }
    }
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;
    use std::time::Duration;

    use crate::testkit::{FakeAuthenticator, ManualClock, StaticUserResolver};

    const LIFETIME: Duration = Duration::from_secs(3600);

    async fn setup(
        policy: Arc<dyn AuthorizationPolicy>,
    ) -> (Authorizer, Arc<CredentialStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let authenticator = Arc::new(FakeAuthenticator::new(clock.clone(), LIFETIME));
        let credentials = Arc::new(CredentialStore::new(
            authenticator,
            clock.clone(),
            Duration::from_secs(60),
        ));
        credentials.login("svc", "/etc/svc.keytab").await.unwrap();

        let users = Arc::new(StaticUserResolver::with_users(&["alice", "bob"]));
        (
            Authorizer::new(credentials.clone(), users, policy),
            credentials,
            clock,
        )
    }

    fn volume(owner: Option<&str>) -> Volume {
        Volume::new(
            "v1",
            "nfs.example.com:/export/v1",
            BTreeMap::new(),
            owner.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn test_allowed() {
        let (authorizer, _, _) = setup(Arc::new(AllowAnyPolicy)).await;
        let decision = authorizer.authorize("alice", &volume(None)).await;
        assert!(decision.allowed);
        assert_eq!(decision.reason, None);
        assert_eq!(decision.volume, "v1");
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (authorizer, _, _) = setup(Arc::new(AllowAnyPolicy)).await;
        let decision = authorizer.authorize("mallory", &volume(None)).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("unknown user"));
        assert_eq!(decision.denial, Some(DenialKind::UnknownUser));
    }

    #[tokio::test]
    async fn test_fails_closed_when_ticket_expires() {
        let (authorizer, _, clock) = setup(Arc::new(AllowAnyPolicy)).await;
        clock.advance(LIFETIME);

        let decision = authorizer.authorize("alice", &volume(None)).await;
        assert!(!decision.allowed);
        assert_eq!(decision.denial, Some(DenialKind::CredentialUnavailable));
    }

    #[tokio::test]
    async fn test_credential_checked_before_user() {
        let (authorizer, _, clock) = setup(Arc::new(AllowAnyPolicy)).await;
        clock.advance(LIFETIME);

        let decision = authorizer.authorize("mallory", &volume(None)).await;
        assert_eq!(decision.denial, Some(DenialKind::CredentialUnavailable));
    }

    #[tokio::test]
    async fn test_policy_denial_reason_surfaces() {
        let (authorizer, _, _) = setup(Arc::new(OwnerPolicy)).await;

        assert!(authorizer.authorize("alice", &volume(Some("alice"))).await.allowed);

        let decision = authorizer.authorize("bob", &volume(Some("alice"))).await;
        assert!(!decision.allowed);
        assert_eq!(decision.denial, Some(DenialKind::PolicyDenied));
        assert!(decision.reason.unwrap().contains("not the owner"));
    }

    #[tokio::test]
    async fn test_deterministic() {
        let (authorizer, _, _) = setup(Arc::new(OwnerPolicy)).await;
        let v = volume(Some("alice"));
        for caller in ["alice", "bob", "mallory"] {
            let first = authorizer.authorize(caller, &v).await;
            for _ in 0..5 {
                assert_eq!(authorizer.authorize(caller, &v).await, first);
            }
        }
    }
}
