//! Pluggable authorization rules
//!
//! The [`Authorizer`](super::Authorizer) handles credential and identity
//! checks itself; whatever is left is decided by an [`AuthorizationPolicy`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::user::UserIdentity;
use crate::driver::Volume;

/// Decides whether a resolved user may mount a volume.
///
/// Returns the denial reason on refusal.
pub trait AuthorizationPolicy: Send + Sync + fmt::Debug {
    fn evaluate(&self, user: &UserIdentity, volume: &Volume) -> Result<(), String>;
}

/// Any user that resolves on this host may mount.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAnyPolicy;

impl AuthorizationPolicy for AllowAnyPolicy {
    fn evaluate(&self, _user: &UserIdentity, _volume: &Volume) -> Result<(), String> {
        Ok(())
    }
}

/// Only the volume's designated owner may mount it.
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnerPolicy;

impl AuthorizationPolicy for OwnerPolicy {
    fn evaluate(&self, user: &UserIdentity, volume: &Volume) -> Result<(), String> {
        match volume.owner.as_deref() {
            Some(owner) if owner == user.name => Ok(()),
            Some(_) => Err(format!(
                "user {} is not the owner of volume {}",
                user.name, volume.name
            )),
            None => Err(format!("volume {} has no designated owner", volume.name)),
        }
    }
}

/// Users named in, or whose uid is in, a fixed allow list.
#[derive(Debug, Default, Clone)]
pub struct AllowListPolicy {
    names: BTreeSet<String>,
    uids: BTreeSet<u32>,
}

impl AllowListPolicy {
    /// Entries that parse as integers are treated as uids, the rest as names.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            match entry.parse::<u32>() {
                Ok(uid) => {
                    policy.uids.insert(uid);
                }
                Err(_) => {
                    policy.names.insert(entry.to_string());
                }
            }
        }
        policy
    }
}

impl AuthorizationPolicy for AllowListPolicy {
    fn evaluate(&self, user: &UserIdentity, _volume: &Volume) -> Result<(), String> {
        if self.names.contains(&user.name) || self.uids.contains(&user.uid) {
            Ok(())
        } else {
            Err(format!("user {} is not in the allow list", user.name))
        }
    }
}

/// Which policy the driver runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    AllowAny,
    Owner,
    AllowList,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::AllowAny => "allow-any",
            PolicyKind::Owner => "owner",
            PolicyKind::AllowList => "allow-list",
        }
    }

    /// Build the policy; `allowed` is only consulted for
    /// [`PolicyKind::AllowList`].
    pub fn build(&self, allowed: &[String]) -> Arc<dyn AuthorizationPolicy> {
        match self {
            PolicyKind::AllowAny => Arc::new(AllowAnyPolicy),
            PolicyKind::Owner => Arc::new(OwnerPolicy),
            PolicyKind::AllowList => Arc::new(AllowListPolicy::new(allowed)),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow-any" => Ok(PolicyKind::AllowAny),
            "owner" => Ok(PolicyKind::Owner),
            "allow-list" => Ok(PolicyKind::AllowList),
            other => Err(format!(
                "unknown policy '{}', expected allow-any, owner or allow-list",
                other
            )),
        }
    }
}
