use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::process::Command;

use super::{AuthenticationError, Authenticator};
use crate::clock::Clock;

/// Default ticket lifetime requested from the KDC
pub const DEFAULT_TICKET_LIFETIME: Duration = Duration::from_secs(10 * 60 * 60);

/// Authenticates by running MIT `kinit` against a keytab.
#[derive(Clone)]
pub struct KinitAuthenticator {
    kinit: PathBuf,
    ticket_lifetime: Duration,
    ccache: Option<String>,
    clock: Arc<dyn Clock>,
}

impl KinitAuthenticator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            kinit: PathBuf::from("kinit"),
            ticket_lifetime: DEFAULT_TICKET_LIFETIME,
            ccache: None,
            clock,
        }
    }

    pub fn with_program(mut self, kinit: impl Into<PathBuf>) -> Self {
        self.kinit = kinit.into();
        self
    }

    pub fn with_ticket_lifetime(mut self, lifetime: Duration) -> Self {
        self.ticket_lifetime = lifetime;
        self
    }

    /// Write tickets to this credential cache (`KRB5CCNAME`) instead of the
    /// process default.
    pub fn with_ccache(mut self, ccache: Option<String>) -> Self {
        self.ccache = ccache;
        self
    }

    async fn check_keytab(keytab: &Path) -> Result<(), AuthenticationError> {
        let metadata = tokio::fs::metadata(keytab).await.map_err(|source| {
            AuthenticationError::KeytabUnreadable {
                path: keytab.to_path_buf(),
                source,
            }
        })?;
        if !metadata.is_file() {
            return Err(AuthenticationError::KeytabNotAFile(keytab.to_path_buf()));
        }
        // opening proves we can actually read it, not just stat it
        tokio::fs::File::open(keytab)
            .await
            .map_err(|source| AuthenticationError::KeytabUnreadable {
                path: keytab.to_path_buf(),
                source,
            })?;
        Ok(())
    }
}

#[async_trait]
impl Authenticator for KinitAuthenticator {
    async fn acquire(
        &self,
        principal: &str,
        keytab: &Path,
    ) -> Result<OffsetDateTime, AuthenticationError> {
        Self::check_keytab(keytab).await?;

        let started = self.clock.now();
        let mut command = Command::new(&self.kinit);
        command
            .arg("-k")
            .arg("-t")
            .arg(keytab)
            .arg("-l")
            .arg(format!("{}s", self.ticket_lifetime.as_secs()))
            .arg(principal)
            .kill_on_drop(true);
        if let Some(ccache) = &self.ccache {
            command.env("KRB5CCNAME", ccache);
        }

        tracing::debug!(principal, program = %self.kinit.display(), "running kinit");
        let output = command
            .output()
            .await
            .map_err(|source| AuthenticationError::Tool {
                program: self.kinit.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("kinit exited with {}", output.status)
            } else {
                stderr
            };
            return Err(AuthenticationError::Rejected {
                principal: principal.to_string(),
                reason,
            });
        }

        // measured from before the call, so we never overestimate
        Ok(started + self.ticket_lifetime)
    }
}

impl std::fmt::Debug for KinitAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KinitAuthenticator")
            .field("kinit", &self.kinit)
            .field("ticket_lifetime", &self.ticket_lifetime)
            .field("ccache", &self.ccache)
            .finish()
    }
}
