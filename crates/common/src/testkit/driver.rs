use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::auth::{AllowAnyPolicy, AuthorizationPolicy, Authorizer};
use crate::credential::CredentialStore;
use crate::driver::VolumeDriver;
use crate::executor::MountExecutor;

use super::{FakeAuthenticator, FakeMountTool, ManualClock, StaticUserResolver};

/// Lifetime of tickets issued to a [`TestDriver`]
pub const TEST_TICKET_LIFETIME: Duration = Duration::from_secs(10 * 60 * 60);

const TEST_RENEW_LEAD: Duration = Duration::from_secs(60 * 60);
const TEST_PRINCIPAL: &str = "svc";
const TEST_KEYTAB: &str = "/etc/svc.keytab";

/// A fully wired [`VolumeDriver`] backed by fakes.
///
/// Users `alice` and `bob` exist. Mountpoints live in a scratch directory
/// that is removed when the harness is dropped.
pub struct TestDriver {
    pub driver: Arc<VolumeDriver>,
    pub credentials: Arc<CredentialStore>,
    pub authenticator: Arc<FakeAuthenticator>,
    pub tool: Arc<FakeMountTool>,
    pub clock: Arc<ManualClock>,
    dir: TempDir,
}

impl TestDriver {
    /// Logged in, with every known user allowed to mount.
    pub async fn new() -> Self {
        Self::with_policy(Arc::new(AllowAnyPolicy)).await
    }

    pub async fn with_policy(policy: Arc<dyn AuthorizationPolicy>) -> Self {
        let t = Self::logged_out(policy);
        t.credentials
            .login(TEST_PRINCIPAL, TEST_KEYTAB)
            .await
            .expect("fake login");
        t
    }

    /// No credential has been acquired yet.
    pub fn logged_out(policy: Arc<dyn AuthorizationPolicy>) -> Self {
        let dir = TempDir::new().expect("scratch dir");
        let clock = Arc::new(ManualClock::default());
        let authenticator = Arc::new(FakeAuthenticator::new(
            clock.clone(),
            TEST_TICKET_LIFETIME,
        ));
        let credentials = Arc::new(CredentialStore::new(
            authenticator.clone(),
            clock.clone(),
            TEST_RENEW_LEAD,
        ));
        let users = Arc::new(StaticUserResolver::with_users(&["alice", "bob"]));
        let tool = Arc::new(FakeMountTool::new());

        let authorizer = Authorizer::new(credentials.clone(), users, policy);
        let executor = MountExecutor::new(
            tool.clone(),
            credentials.clone(),
            dir.path().join("volumes"),
        );

        Self {
            driver: Arc::new(VolumeDriver::new(authorizer, executor)),
            credentials,
            authenticator,
            tool,
            clock,
            dir,
        }
    }

    /// Create options pointing at `export` on a test server.
    pub fn source(&self, export: &str) -> BTreeMap<String, String> {
        [(
            "source".to_string(),
            format!("nfs://nfs.example.com/{}", export),
        )]
        .into()
    }

    /// Move the clock past the end of the current ticket.
    pub fn expire_credential(&self) {
        self.clock.advance(TEST_TICKET_LIFETIME);
    }

    pub fn scratch_dir(&self) -> &std::path::Path {
        self.dir.path()
    }
}
