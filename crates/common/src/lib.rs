/**
 * Kerberos service credential: login, validity
 *  and background renewal.
 */
pub mod credential;
/**
 * Per-mount authorization: caller identity
 *  resolution and pluggable policies.
 */
pub mod auth;
/**
 * OS mount execution with sharing of
 *  identical physical mounts.
 */
pub mod executor;
/**
 * The volume driver itself: named volumes
 *  and their mount lifecycle.
 */
pub mod driver;
pub mod clock;
pub mod locks;
/**
 * Fakes for every external collaborator,
 *  used by unit and integration tests.
 */
pub mod testkit;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::auth::{AuthorizationPolicy, Authorizer, PolicyKind, UserResolver};
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::credential::{AuthenticationError, CredentialStore, KinitAuthenticator};
    pub use crate::driver::{Capabilities, DriverError, VolumeDriver, VolumeInfo};
    pub use crate::executor::{MountExecutor, MountTool, SystemMountTool};
    pub use crate::version::build_info;
}
