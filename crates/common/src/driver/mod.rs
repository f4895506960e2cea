//! Volume driver state machine
//!
//! Volumes move `Created → Mounted → Created` and are removed from the
//! registry on Remove. Each volume has its own async lock; every operation on
//! a volume, including the external mount call it makes, runs while holding
//! that lock, so operations on one volume apply in arrival order while
//! different volumes proceed independently. Mount and Unmount run on their
//! own task and always commit their outcome, even if the caller goes away.

mod volume;

pub use volume::{
    parse_create_options, parse_source, validate_name, CreateOptions, Volume, VolumeInfo,
    VolumeState, OWNER_OPTION, SOURCE_OPTION,
};

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::auth::{Authorizer, DenialKind};
use crate::executor::{ActiveMount, ExecutorError, MountExecutor};

/// How mounts of one volume relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountScope {
    /// Concurrent mounters share a single OS mount
    Shared,
    /// Each volume can be mounted by one holder at a time
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub scope: MountScope,
}

struct VolumeSlot {
    volume: Volume,
    // set by Remove; anyone who was already waiting on the lock treats the
    // volume as gone
    removed: bool,
}

type SlotRef = Arc<Mutex<VolumeSlot>>;

pub struct VolumeDriver {
    inner: Arc<DriverInner>,
}

struct DriverInner {
    authorizer: Authorizer,
    executor: MountExecutor,
    volumes: parking_lot::RwLock<HashMap<String, SlotRef>>,
}

impl VolumeDriver {
    pub fn new(authorizer: Authorizer, executor: MountExecutor) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                authorizer,
                executor,
                volumes: parking_lot::RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a volume. Creating a name that already exists is a no-op.
    pub async fn create(
        &self,
        name: &str,
        opts: &BTreeMap<String, String>,
    ) -> Result<(), DriverError> {
        self.inner.create(name, opts)
    }

    /// Mount a volume on behalf of `caller`, returning the local mountpoint.
    ///
    /// Runs on its own task: a caller that stops waiting does not stop the
    /// mount, and the volume's count always reflects the outcome.
    pub async fn mount(&self, name: &str, caller: &str) -> Result<PathBuf, DriverError> {
        let inner = self.inner.clone();
        let (name, caller) = (name.to_string(), caller.to_string());
        run_detached(async move { inner.mount(&name, &caller).await }).await
    }

    /// Local path of a mounted volume.
    pub async fn path(&self, name: &str) -> Result<PathBuf, DriverError> {
        self.inner.path(name).await
    }

    /// Release one mount of a volume. Unmounting an unmounted volume
    /// succeeds without doing anything.
    pub async fn unmount(&self, name: &str, caller: &str) -> Result<(), DriverError> {
        let inner = self.inner.clone();
        let (name, caller) = (name.to_string(), caller.to_string());
        run_detached(async move { inner.unmount(&name, &caller).await }).await
    }

    /// Delete an unmounted volume.
    pub async fn remove(&self, name: &str) -> Result<(), DriverError> {
        self.inner.remove(name).await
    }

    pub async fn get(&self, name: &str) -> Result<VolumeInfo, DriverError> {
        self.inner.get(name).await
    }

    /// Every registered volume, sorted by name.
    pub async fn list(&self) -> Vec<VolumeInfo> {
        self.inner.list().await
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            scope: MountScope::Shared,
        }
    }

    /// OS mounts currently held, across all volumes.
    pub fn active_mounts(&self) -> Vec<ActiveMount> {
        self.inner.executor.active()
    }
}

async fn run_detached<T: Send + 'static>(
    op: impl std::future::Future<Output = Result<T, DriverError>> + Send + 'static,
) -> Result<T, DriverError> {
    tokio::spawn(op)
        .await
        .unwrap_or_else(|e| Err(DriverError::Mount(format!("operation aborted: {}", e))))
}

impl DriverInner {
    fn slot(&self, name: &str) -> Result<SlotRef, DriverError> {
        self.volumes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(name.to_string()))
    }

    fn create(&self, name: &str, opts: &BTreeMap<String, String>) -> Result<(), DriverError> {
        validate_name(name).map_err(DriverError::InvalidArgument)?;
        let parsed = parse_create_options(opts).map_err(DriverError::InvalidArgument)?;

        let mut volumes = self.volumes.write();
        if volumes.contains_key(name) {
            tracing::debug!(volume = name, "volume already exists");
            return Ok(());
        }
        volumes.insert(
            name.to_string(),
            Arc::new(Mutex::new(VolumeSlot {
                volume: Volume::new(name, parsed.target.clone(), parsed.mount_opts, parsed.owner),
                removed: false,
            })),
        );
        tracing::info!(volume = name, export = %parsed.target, "volume created");
        Ok(())
    }

    async fn mount(&self, name: &str, caller: &str) -> Result<PathBuf, DriverError> {
        let slot = self.slot(name)?;
        let mut slot = slot.lock().await;
        if slot.removed {
            return Err(DriverError::NotFound(name.to_string()));
        }

        let decision = self.authorizer.authorize(caller, &slot.volume).await;
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| "permission denied".to_string());
            return Err(match decision.denial {
                Some(DenialKind::CredentialUnavailable) => DriverError::Authentication(reason),
                _ => DriverError::Authorization(reason),
            });
        }

        let mountpoint = self
            .executor
            .mount(&slot.volume.mount_target, &slot.volume.mount_opts)
            .await?;

        slot.volume.refcount += 1;
        slot.volume.mountpoint = Some(mountpoint.clone());
        tracing::info!(
            volume = name,
            caller,
            refcount = slot.volume.refcount,
            mountpoint = %mountpoint.display(),
            "volume mounted"
        );
        Ok(mountpoint)
    }

    async fn path(&self, name: &str) -> Result<PathBuf, DriverError> {
        let slot = self.slot(name)?;
        let slot = slot.lock().await;
        if slot.removed {
            return Err(DriverError::NotFound(name.to_string()));
        }
        match (&slot.volume.mountpoint, slot.volume.refcount) {
            (Some(mountpoint), refcount) if refcount > 0 => Ok(mountpoint.clone()),
            _ => Err(DriverError::NotMounted(name.to_string())),
        }
    }

    async fn unmount(&self, name: &str, caller: &str) -> Result<(), DriverError> {
        let slot = self.slot(name)?;
        let mut slot = slot.lock().await;
        if slot.removed {
            return Err(DriverError::NotFound(name.to_string()));
        }

        if slot.volume.refcount == 0 {
            tracing::debug!(volume = name, caller, "volume already unmounted");
            return Ok(());
        }
        let Some(mountpoint) = slot.volume.mountpoint.clone() else {
            tracing::warn!(volume = name, "mounted volume has no mountpoint, resetting");
            slot.volume.refcount = 0;
            return Ok(());
        };

        self.executor.unmount(&mountpoint).await?;

        slot.volume.refcount -= 1;
        if slot.volume.refcount == 0 {
            slot.volume.mountpoint = None;
        }
        tracing::info!(
            volume = name,
            caller,
            refcount = slot.volume.refcount,
            "volume unmounted"
        );
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), DriverError> {
        let slot_ref = self.slot(name)?;
        let mut slot = slot_ref.lock().await;
        if slot.removed {
            return Err(DriverError::NotFound(name.to_string()));
        }
        if slot.volume.refcount > 0 {
            return Err(DriverError::VolumeBusy(name.to_string()));
        }

        slot.removed = true;
        let mut volumes = self.volumes.write();
        if volumes
            .get(name)
            .map(|current| Arc::ptr_eq(current, &slot_ref))
            .unwrap_or(false)
        {
            volumes.remove(name);
        }
        tracing::info!(volume = name, "volume removed");
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<VolumeInfo, DriverError> {
        let slot = self.slot(name)?;
        let slot = slot.lock().await;
        if slot.removed {
            return Err(DriverError::NotFound(name.to_string()));
        }
        Ok(slot.volume.info())
    }

    async fn list(&self) -> Vec<VolumeInfo> {
        let slots: Vec<SlotRef> = self.volumes.read().values().cloned().collect();

        let mut infos = Vec::with_capacity(slots.len());
        for slot in slots {
            let slot = slot.lock().await;
            if !slot.removed {
                infos.push(slot.volume.info());
            }
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

impl std::fmt::Debug for VolumeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeDriver")
            .field("authorizer", &self.inner.authorizer)
            .field("executor", &self.inner.executor)
            .field("volumes", &self.inner.volumes.read().len())
            .finish()
    }
}

/// Errors surfaced to driver callers. Messages are safe to show to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("authentication unavailable: {0}")]
    Authentication(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("mount failed: {0}")]
    Mount(String),

    #[error("volume not found: {0}")]
    NotFound(String),

    #[error("volume not mounted: {0}")]
    NotMounted(String),

    #[error("volume is in use: {0}")]
    VolumeBusy(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl DriverError {
    pub fn kind(&self) -> &'static str {
        match self {
            DriverError::Authentication(_) => "authentication",
            DriverError::Authorization(_) => "authorization",
            DriverError::Mount(_) => "mount",
            DriverError::NotFound(_) => "not_found",
            DriverError::NotMounted(_) => "not_mounted",
            DriverError::VolumeBusy(_) => "volume_busy",
            DriverError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

impl From<ExecutorError> for DriverError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::CredentialUnavailable => DriverError::Authentication(e.to_string()),
            ExecutorError::InsecureFlavor(_) => DriverError::InvalidArgument(e.to_string()),
            ExecutorError::NotFound(ref mountpoint) => {
                DriverError::NotFound(mountpoint.display().to_string())
            }
            ExecutorError::Io { .. }
            | ExecutorError::MountFailed { .. }
            | ExecutorError::UnmountFailed { .. }
            | ExecutorError::Aborted(_) => DriverError::Mount(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testkit::TestDriver;

    fn source(export: &str) -> BTreeMap<String, String> {
        [("source".to_string(), format!("nfs://nfs.example.com/{}", export))].into()
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let t = TestDriver::new().await;
        t.driver.create("v1", &source("one")).await.unwrap();
        // second create with different options changes nothing
        t.driver.create("v1", &source("two")).await.unwrap();

        let info = t.driver.get("v1").await.unwrap();
        assert_eq!(info.target, "nfs.example.com:/one");
        assert_eq!(t.driver.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_options() {
        let t = TestDriver::new().await;
        let err = t.driver.create("v1", &BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));

        let err = t.driver.create("a/b", &source("x")).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
        assert!(t.driver.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_volume() {
        let t = TestDriver::new().await;
        assert!(matches!(
            t.driver.path("unknownvol").await,
            Err(DriverError::NotFound(_))
        ));
        assert!(matches!(
            t.driver.mount("unknownvol", "alice").await,
            Err(DriverError::NotFound(_))
        ));
        assert!(matches!(
            t.driver.unmount("unknownvol", "alice").await,
            Err(DriverError::NotFound(_))
        ));
        assert!(matches!(
            t.driver.remove("unknownvol").await,
            Err(DriverError::NotFound(_))
        ));
        assert!(matches!(
            t.driver.get("unknownvol").await,
            Err(DriverError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mount_path_unmount() {
        let t = TestDriver::new().await;
        t.driver.create("v1", &source("data")).await.unwrap();
        assert!(matches!(
            t.driver.path("v1").await,
            Err(DriverError::NotMounted(_))
        ));

        let mountpoint = t.driver.mount("v1", "alice").await.unwrap();
        assert_eq!(t.driver.path("v1").await.unwrap(), mountpoint);
        let info = t.driver.get("v1").await.unwrap();
        assert_eq!(info.state, VolumeState::Mounted);
        assert_eq!(info.refcount, 1);

        t.driver.unmount("v1", "alice").await.unwrap();
        let info = t.driver.get("v1").await.unwrap();
        assert_eq!(info.state, VolumeState::Created);
        assert_eq!(info.mountpoint, None);
        assert_eq!(t.tool.unmount_calls(), 1);
    }

    #[tokio::test]
    async fn test_unmount_unmounted_is_noop() {
        let t = TestDriver::new().await;
        t.driver.create("v1", &source("data")).await.unwrap();

        t.driver.unmount("v1", "alice").await.unwrap();
        t.driver.unmount("v1", "alice").await.unwrap();
        assert_eq!(t.tool.unmount_calls(), 0);
        assert_eq!(t.driver.get("v1").await.unwrap().refcount, 0);
    }

    #[tokio::test]
    async fn test_remove_busy_volume() {
        let t = TestDriver::new().await;
        t.driver.create("v1", &source("data")).await.unwrap();
        t.driver.mount("v1", "alice").await.unwrap();

        assert!(matches!(
            t.driver.remove("v1").await,
            Err(DriverError::VolumeBusy(_))
        ));
        // nothing was deleted
        assert_eq!(t.driver.get("v1").await.unwrap().refcount, 1);

        t.driver.unmount("v1", "alice").await.unwrap();
        t.driver.remove("v1").await.unwrap();
        assert!(matches!(
            t.driver.get("v1").await,
            Err(DriverError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_denied_mount_changes_nothing() {
        let t = TestDriver::new().await;
        t.driver.create("v1", &source("data")).await.unwrap();

        let err = t.driver.mount("v1", "mallory").await.unwrap_err();
        assert_eq!(err, DriverError::Authorization("unknown user".to_string()));
        assert_eq!(t.tool.mount_calls(), 0);
        assert_eq!(t.driver.get("v1").await.unwrap().refcount, 0);
    }

    #[tokio::test]
    async fn test_expired_credential_is_authentication_error() {
        let t = TestDriver::new().await;
        t.driver.create("v1", &source("data")).await.unwrap();
        t.expire_credential();

        let err = t.driver.mount("v1", "alice").await.unwrap_err();
        assert!(matches!(err, DriverError::Authentication(_)));
        assert!(!err.to_string().contains("keytab"));
    }

    #[tokio::test]
    async fn test_os_mount_failure_leaves_refcount() {
        let t = TestDriver::new().await;
        t.driver.create("v1", &source("data")).await.unwrap();
        t.tool.fail_mounts("mount.nfs4: Connection timed out");

        let err = t.driver.mount("v1", "alice").await.unwrap_err();
        assert!(matches!(err, DriverError::Mount(_)));
        let info = t.driver.get("v1").await.unwrap();
        assert_eq!(info.refcount, 0);
        assert_eq!(info.mountpoint, None);
    }

    #[tokio::test]
    async fn test_volumes_with_same_export_share_mount() {
        let t = TestDriver::new().await;
        t.driver.create("a", &source("shared")).await.unwrap();
        t.driver.create("b", &source("shared")).await.unwrap();

        let a = t.driver.mount("a", "alice").await.unwrap();
        let b = t.driver.mount("b", "bob").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(t.tool.mount_calls(), 1);

        t.driver.unmount("a", "alice").await.unwrap();
        assert_eq!(t.tool.unmount_calls(), 0);
        assert_eq!(t.driver.path("b").await.unwrap(), b);

        t.driver.unmount("b", "bob").await.unwrap();
        assert_eq!(t.tool.unmount_calls(), 1);
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let t = TestDriver::new().await;
        for name in ["zeta", "alpha", "mid"] {
            t.driver.create(name, &source(name)).await.unwrap();
        }
        let names: Vec<String> = t.driver.list().await.into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_abandoned_mount_is_counted() {
        let t = TestDriver::new().await;
        t.driver.create("v1", &source("data")).await.unwrap();
        t.tool.set_delay(std::time::Duration::from_millis(200));

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            t.driver.mount("v1", "alice"),
        )
        .await;
        assert!(abandoned.is_err());

        // waits on the volume lock until the mount has been committed
        let info = t.driver.get("v1").await.unwrap();
        assert_eq!(info.state, VolumeState::Mounted);
        assert_eq!(info.refcount, 1);
        assert_eq!(t.tool.mount_calls(), 1);
        assert_eq!(t.driver.active_mounts().len(), 1);

        t.driver.unmount("v1", "alice").await.unwrap();
        t.driver.remove("v1").await.unwrap();
        assert_eq!(t.tool.unmount_calls(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_unmount_is_counted() {
        let t = TestDriver::new().await;
        t.driver.create("v1", &source("data")).await.unwrap();
        t.driver.mount("v1", "alice").await.unwrap();
        t.tool.set_delay(std::time::Duration::from_millis(200));

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            t.driver.unmount("v1", "alice"),
        )
        .await;
        assert!(abandoned.is_err());

        let info = t.driver.get("v1").await.unwrap();
        assert_eq!(info.state, VolumeState::Created);
        assert_eq!(info.refcount, 0);
        assert!(t.driver.active_mounts().is_empty());
        t.driver.remove("v1").await.unwrap();
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(DriverError::VolumeBusy("v".into()).kind(), "volume_busy");
        let from_executor: DriverError = ExecutorError::CredentialUnavailable.into();
        assert!(matches!(from_executor, DriverError::Authentication(_)));
    }
}
