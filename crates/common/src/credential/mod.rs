//! Kerberos credential lifecycle
//!
//! A [`CredentialStore`] holds the single ticket this process authenticates
//! with. It is logged in once at startup and kept fresh by [`run_renewal`];
//! everything else only asks whether the ticket is currently valid.

mod kinit;

pub use kinit::{KinitAuthenticator, DEFAULT_TICKET_LIFETIME};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;

/// Exchanges a keytab for a ticket.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Obtain a fresh ticket for `principal`, returning its expiry.
    async fn acquire(
        &self,
        principal: &str,
        keytab: &Path,
    ) -> Result<OffsetDateTime, AuthenticationError>;

    /// Refresh a running ticket. Re-acquiring from the keytab is always a
    /// valid renewal, so that is the default.
    async fn renew(
        &self,
        principal: &str,
        keytab: &Path,
    ) -> Result<OffsetDateTime, AuthenticationError> {
        self.acquire(principal, keytab).await
    }
}

/// The live ticket.
#[derive(Debug, Clone)]
pub struct Credential {
    pub principal: String,
    pub keytab_path: PathBuf,
    pub acquired_at: OffsetDateTime,
    pub valid_until: OffsetDateTime,
}

/// What [`CredentialStore::renew_if_needed`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    NotNeeded,
    Renewed,
}

/// Point-in-time view of the store, safe to hand to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialStatus {
    pub principal: Option<String>,
    pub valid: bool,
    pub acquired_at: Option<String>,
    pub valid_until: Option<String>,
    pub renewal_failures: u64,
    /// Kind of the last renewal failure, see [`AuthenticationError::kind`].
    pub last_renewal_error: Option<String>,
}

pub struct CredentialStore {
    authenticator: Arc<dyn Authenticator>,
    clock: Arc<dyn Clock>,
    renew_lead: Duration,
    credential: RwLock<Option<Credential>>,
    // serializes login and renewal; readers never touch it
    refresh: Mutex<()>,
    renewal_failures: AtomicU64,
    last_renewal_error: RwLock<Option<&'static str>>,
}

impl CredentialStore {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        clock: Arc<dyn Clock>,
        renew_lead: Duration,
    ) -> Self {
        Self {
            authenticator,
            clock,
            renew_lead,
            credential: RwLock::new(None),
            refresh: Mutex::new(()),
            renewal_failures: AtomicU64::new(0),
            last_renewal_error: RwLock::new(None),
        }
    }

    /// Acquire a ticket for `principal` from `keytab`.
    ///
    /// On failure the previous credential, if any, is left untouched.
    pub async fn login(
        &self,
        principal: &str,
        keytab: impl AsRef<Path>,
    ) -> Result<(), AuthenticationError> {
        let keytab = keytab.as_ref();
        if principal.trim().is_empty() {
            return Err(AuthenticationError::MissingPrincipal);
        }

        let _refresh = self.refresh.lock().await;
        let acquired_at = self.clock.now();

        let valid_until = match self.authenticator.acquire(principal, keytab).await {
            Ok(valid_until) => valid_until,
            Err(e) => {
                tracing::error!(principal, error = %e, "kerberos login failed");
                return Err(e);
            }
        };

        tracing::info!(
            principal,
            valid_until = %format_time(valid_until),
            "kerberos login succeeded"
        );

        *self.credential.write() = Some(Credential {
            principal: principal.to_string(),
            keytab_path: keytab.to_path_buf(),
            acquired_at,
            valid_until,
        });

        Ok(())
    }

    /// Whether a ticket was acquired and has not yet expired.
    pub fn is_valid(&self) -> bool {
        let now = self.clock.now();
        self.credential
            .read()
            .as_ref()
            .map(|c| c.valid_until > now)
            .unwrap_or(false)
    }

    /// The current credential, if one was ever acquired.
    pub fn current(&self) -> Option<Credential> {
        self.credential.read().clone()
    }

    /// Re-acquire the ticket once it is within the renewal lead time of its
    /// expiry. A failed renewal keeps the old ticket in place.
    pub async fn renew_if_needed(&self) -> Result<Renewal, AuthenticationError> {
        let _refresh = self.refresh.lock().await;

        let (principal, keytab, valid_until) = match self.credential.read().as_ref() {
            Some(c) => (c.principal.clone(), c.keytab_path.clone(), c.valid_until),
            None => return Err(AuthenticationError::NotLoggedIn),
        };

        let now = self.clock.now();
        if valid_until - now > self.renew_lead {
            return Ok(Renewal::NotNeeded);
        }

        match self.authenticator.renew(&principal, &keytab).await {
            Ok(new_valid_until) => {
                if let Some(credential) = self.credential.write().as_mut() {
                    credential.acquired_at = now;
                    credential.valid_until = new_valid_until;
                }
                *self.last_renewal_error.write() = None;
                tracing::info!(
                    principal = %principal,
                    valid_until = %format_time(new_valid_until),
                    "kerberos ticket renewed"
                );
                Ok(Renewal::Renewed)
            }
            Err(e) => {
                let failures = self.renewal_failures.fetch_add(1, Ordering::Relaxed) + 1;
                *self.last_renewal_error.write() = Some(e.kind());
                tracing::warn!(
                    principal = %principal,
                    failures,
                    expires = %format_time(valid_until),
                    error = %e,
                    "kerberos ticket renewal failed, keeping current ticket"
                );
                Err(e)
            }
        }
    }

    pub fn status(&self) -> CredentialStatus {
        let credential = self.credential.read().clone();
        CredentialStatus {
            principal: credential.as_ref().map(|c| c.principal.clone()),
            valid: self.is_valid(),
            acquired_at: credential.as_ref().map(|c| format_time(c.acquired_at)),
            valid_until: credential.as_ref().map(|c| format_time(c.valid_until)),
            renewal_failures: self.renewal_failures.load(Ordering::Relaxed),
            last_renewal_error: (*self.last_renewal_error.read()).map(str::to_string),
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("renew_lead", &self.renew_lead)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Periodically renew the store's ticket until `shutdown_rx` fires.
///
/// Failures are already logged and counted by the store; the loop keeps
/// going so a transient KDC outage heals on a later tick.
pub async fn run_renewal(
    store: Arc<CredentialStore>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately; login just happened
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.renew_if_needed().await {
                    Ok(Renewal::Renewed) | Ok(Renewal::NotNeeded) => {}
                    Err(e) => tracing::debug!(error = %e, "renewal tick failed"),
                }
            }
            _ = shutdown_rx.changed() => {
                tracing::debug!("credential renewal stopping");
                break;
            }
        }
    }
}

fn format_time(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| t.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("no kerberos principal configured")]
    MissingPrincipal,

    #[error("keytab {path} is not readable: {source}")]
    KeytabUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("keytab {0} is not a regular file")]
    KeytabNotAFile(PathBuf),

    #[error("failed to run {program}: {source}")]
    Tool {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication rejected for {principal}: {reason}")]
    Rejected { principal: String, reason: String },

    #[error("no credential has been acquired")]
    NotLoggedIn,
}

impl AuthenticationError {
    /// Stable name for the failure that carries no paths or tool output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingPrincipal => "missing_principal",
            Self::KeytabUnreadable { .. } => "keytab_unreadable",
            Self::KeytabNotAFile(_) => "keytab_not_a_file",
            Self::Tool { .. } => "tool_failed",
            Self::Rejected { .. } => "rejected",
            Self::NotLoggedIn => "not_logged_in",
        }
    }
}
