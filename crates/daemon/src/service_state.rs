use std::path::PathBuf;
use std::sync::Arc;

use common::auth::{Authorizer, SystemUserResolver};
use common::clock::SystemClock;
use common::credential::{AuthenticationError, CredentialStore, KinitAuthenticator};
use common::driver::VolumeDriver;
use common::executor::{MountExecutor, SystemMountTool};

use crate::service_config::{Config, ConfigError};

/// Shared handles for every request handler and background task.
#[derive(Clone)]
pub struct State {
    driver: Arc<VolumeDriver>,
    credentials: Arc<CredentialStore>,
}

impl State {
    pub fn new(driver: Arc<VolumeDriver>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            driver,
            credentials,
        }
    }

    /// Wire up the production collaborators and log in.
    ///
    /// A failed login is fatal: the service never starts without a ticket.
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        config.validate()?;

        let clock = Arc::new(SystemClock);
        let authenticator = KinitAuthenticator::new(clock.clone())
            .with_program(&config.kinit_program)
            .with_ticket_lifetime(config.ticket_lifetime)
            .with_ccache(config.ccache.clone());
        let credentials = Arc::new(CredentialStore::new(
            Arc::new(authenticator),
            clock,
            config.renew_lead,
        ));
        credentials.login(&config.principal, &config.keytab).await?;

        let users = Arc::new(SystemUserResolver);
        let policy = config.policy.build(&config.allowed_users);
        tracing::info!(policy = %config.policy, "authorization policy selected");
        let authorizer = Authorizer::new(credentials.clone(), users, policy);

        tokio::fs::create_dir_all(&config.mount_dir)
            .await
            .map_err(|source| StateSetupError::MountDir {
                path: config.mount_dir.clone(),
                source,
            })?;
        let tool = SystemMountTool::new(&config.mount_program, &config.umount_program)
            .with_fstype(&config.fstype)
            .with_ccache(config.ccache.clone());
        let executor = MountExecutor::new(Arc::new(tool), credentials.clone(), &config.mount_dir);

        Ok(Self::new(
            Arc::new(VolumeDriver::new(authorizer, executor)),
            credentials,
        ))
    }

    pub fn driver(&self) -> &Arc<VolumeDriver> {
        &self.driver
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("driver", &self.driver)
            .field("credentials", &self.credentials)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("kerberos login failed: {0}")]
    Login(#[from] AuthenticationError),
    #[error("failed to create mount directory {path}: {source}")]
    MountDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        let keytab = dir.path().join("svc.keytab");
        std::fs::write(&keytab, b"not really a keytab").unwrap();
        Config {
            principal: "svc@EXAMPLE.COM".to_string(),
            keytab,
            // `true` stands in for a kinit that always succeeds
            kinit_program: PathBuf::from("true"),
            mount_dir: dir.path().join("volumes"),
            ticket_lifetime: Duration::from_secs(3600),
            renew_lead: Duration::from_secs(60),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_from_config_logs_in() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        let state = State::from_config(&config).await.unwrap();
        assert!(state.credentials().is_valid());
        assert!(config.mount_dir.is_dir());
        assert!(state.driver().list().await.is_empty());
    }

    #[tokio::test]
    async fn test_from_config_fails_on_rejected_login() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            kinit_program: PathBuf::from("false"),
            ..config(&dir)
        };

        let result = State::from_config(&config).await;
        assert!(matches!(result, Err(StateSetupError::Login(_))));
    }

    #[tokio::test]
    async fn test_from_config_fails_on_missing_keytab() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            keytab: dir.path().join("badkeytab"),
            ..config(&dir)
        };

        let result = State::from_config(&config).await;
        assert!(matches!(
            result,
            Err(StateSetupError::Login(AuthenticationError::KeytabUnreadable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_from_config_validates_first() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            principal: String::new(),
            ..config(&dir)
        };

        let result = State::from_config(&config).await;
        assert!(matches!(result, Err(StateSetupError::Config(_))));
    }
}
