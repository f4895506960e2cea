//! Mount execution and physical mount sharing
//!
//! The [`MountExecutor`] owns every OS-level mount this driver makes. Mounts
//! are keyed by their physical target (remote export plus effective options);
//! asking for a target that is already mounted only bumps its reference
//! count. The OS unmount happens when the last holder lets go.

mod system;

pub use system::{SystemMountTool, DEFAULT_FSTYPE};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::credential::CredentialStore;
use crate::locks::KeyedLocks;

/// Mount option name → value. An empty value renders as a bare flag.
pub type MountOptions = BTreeMap<String, String>;

/// Security option controlling the NFS authentication flavor
pub const SECURITY_OPTION: &str = "sec";
/// Flavor applied when the caller does not choose one
pub const DEFAULT_SECURITY_FLAVOR: &str = "krb5";
/// Kerberos flavors; anything else would bypass the credential
pub const KERBEROS_FLAVORS: &[&str] = &["krb5", "krb5i", "krb5p"];

/// Performs the actual OS mount and unmount.
///
/// Errors are the tool's own description of what went wrong.
#[async_trait]
pub trait MountTool: Send + Sync {
    async fn mount(
        &self,
        target: &str,
        mountpoint: &Path,
        options: &MountOptions,
    ) -> Result<(), String>;

    async fn unmount(&self, mountpoint: &Path) -> Result<(), String>;
}

/// Render options as a `mount -o` argument.
pub fn render_options(options: &MountOptions) -> String {
    options
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                key.clone()
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Apply the Kerberos security flavor, rejecting non-Kerberos flavors.
pub fn security_options(options: &MountOptions) -> Result<MountOptions, ExecutorError> {
    let mut options = options.clone();
    let flavor = options
        .entry(SECURITY_OPTION.to_string())
        .or_insert_with(|| DEFAULT_SECURITY_FLAVOR.to_string());
    if !KERBEROS_FLAVORS.contains(&flavor.as_str()) {
        return Err(ExecutorError::InsecureFlavor(flavor.clone()));
    }
    Ok(options)
}

/// Identity of a physical mount.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MountKey {
    target: String,
    options: MountOptions,
}

impl MountKey {
    /// Stable directory name for this target under the mount root.
    fn dir_name(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.target.as_bytes());
        hasher.update([0u8]);
        hasher.update(render_options(&self.options).as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }
}

#[derive(Debug)]
struct MountEntry {
    mountpoint: PathBuf,
    refcount: usize,
}

#[derive(Debug, Default)]
struct MountTable {
    entries: HashMap<MountKey, MountEntry>,
    by_mountpoint: HashMap<PathBuf, MountKey>,
}

/// A live OS mount and how many holders share it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveMount {
    pub target: String,
    pub options: MountOptions,
    pub mountpoint: PathBuf,
    pub refcount: usize,
}

/// Owns every OS mount the driver makes.
///
/// Mounts and unmounts run on their own task; once the external tool has
/// been started the operation finishes and records its result even if the
/// caller stops waiting.
pub struct MountExecutor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    tool: Arc<dyn MountTool>,
    credentials: Arc<CredentialStore>,
    mount_root: PathBuf,
    locks: KeyedLocks<MountKey>,
    // only ever locked briefly, never across an await
    table: parking_lot::Mutex<MountTable>,
}

impl MountExecutor {
    pub fn new(
        tool: Arc<dyn MountTool>,
        credentials: Arc<CredentialStore>,
        mount_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                tool,
                credentials,
                mount_root: mount_root.into(),
                locks: KeyedLocks::new(),
                table: parking_lot::Mutex::new(MountTable::default()),
            }),
        }
    }

    pub fn mount_root(&self) -> &Path {
        &self.inner.mount_root
    }

    /// Mount `target`, or join an existing mount of the same target.
    ///
    /// Returns the local mountpoint. Nothing is recorded unless the OS mount
    /// succeeded.
    pub async fn mount(
        &self,
        target: &str,
        options: &MountOptions,
    ) -> Result<PathBuf, ExecutorError> {
        let key = MountKey {
            target: target.to_string(),
            options: security_options(options)?,
        };
        let inner = self.inner.clone();
        run_detached(async move { inner.mount(key).await }).await
    }

    /// Release one holder of the mount at `mountpoint`.
    ///
    /// The last holder triggers the OS unmount; if that fails the mount and
    /// its count stay as they were so the caller can retry.
    pub async fn unmount(&self, mountpoint: &Path) -> Result<(), ExecutorError> {
        let inner = self.inner.clone();
        let mountpoint = mountpoint.to_path_buf();
        run_detached(async move { inner.unmount(&mountpoint).await }).await
    }

    /// Current holder count of the mount at `mountpoint`, zero if none.
    pub fn refcount(&self, mountpoint: &Path) -> usize {
        let table = self.inner.table.lock();
        table
            .by_mountpoint
            .get(mountpoint)
            .and_then(|key| table.entries.get(key))
            .map(|entry| entry.refcount)
            .unwrap_or(0)
    }

    /// All live mounts, ordered by mountpoint.
    pub fn active(&self) -> Vec<ActiveMount> {
        let table = self.inner.table.lock();
        let mut mounts: Vec<ActiveMount> = table
            .entries
            .iter()
            .map(|(key, entry)| ActiveMount {
                target: key.target.clone(),
                options: key.options.clone(),
                mountpoint: entry.mountpoint.clone(),
                refcount: entry.refcount,
            })
            .collect();
        mounts.sort_by(|a, b| a.mountpoint.cmp(&b.mountpoint));
        mounts
    }
}

async fn run_detached<T: Send + 'static>(
    op: impl std::future::Future<Output = Result<T, ExecutorError>> + Send + 'static,
) -> Result<T, ExecutorError> {
    tokio::spawn(op)
        .await
        .unwrap_or_else(|e| Err(ExecutorError::Aborted(e.to_string())))
}

impl ExecutorInner {
    async fn mount(&self, key: MountKey) -> Result<PathBuf, ExecutorError> {
        let target = key.target.clone();
        let _guard = self.locks.lock(&key).await;

        {
            let mut table = self.table.lock();
            if let Some(entry) = table.entries.get_mut(&key) {
                entry.refcount += 1;
                tracing::debug!(
                    export = %target,
                    mountpoint = %entry.mountpoint.display(),
                    refcount = entry.refcount,
                    "sharing existing mount"
                );
                return Ok(entry.mountpoint.clone());
            }
        }

        if !self.credentials.is_valid() {
            return Err(ExecutorError::CredentialUnavailable);
        }

        let mountpoint = self.mount_root.join(key.dir_name());
        tokio::fs::create_dir_all(&mountpoint)
            .await
            .map_err(|source| ExecutorError::Io {
                path: mountpoint.clone(),
                source,
            })?;

        if let Err(reason) = self.tool.mount(&key.target, &mountpoint, &key.options).await {
            tracing::warn!(
                export = %target,
                mountpoint = %mountpoint.display(),
                reason = %reason,
                "mount failed"
            );
            if let Err(e) = tokio::fs::remove_dir(&mountpoint).await {
                tracing::debug!(mountpoint = %mountpoint.display(), error = %e, "failed to clean up mountpoint");
            }
            return Err(ExecutorError::MountFailed {
                target: key.target.clone(),
                reason,
            });
        }

        {
            let mut table = self.table.lock();
            table.by_mountpoint.insert(mountpoint.clone(), key.clone());
            table.entries.insert(
                key,
                MountEntry {
                    mountpoint: mountpoint.clone(),
                    refcount: 1,
                },
            );
        }

        tracing::info!(export = %target, mountpoint = %mountpoint.display(), "mounted");
        Ok(mountpoint)
    }

    async fn unmount(&self, mountpoint: &Path) -> Result<(), ExecutorError> {
        let key = self
            .table
            .lock()
            .by_mountpoint
            .get(mountpoint)
            .cloned()
            .ok_or_else(|| ExecutorError::NotFound(mountpoint.to_path_buf()))?;
        let _guard = self.locks.lock(&key).await;

        {
            let mut table = self.table.lock();
            let entry = table
                .entries
                .get_mut(&key)
                .filter(|entry| entry.mountpoint == mountpoint)
                .ok_or_else(|| ExecutorError::NotFound(mountpoint.to_path_buf()))?;
            if entry.refcount > 1 {
                entry.refcount -= 1;
                tracing::debug!(
                    mountpoint = %mountpoint.display(),
                    refcount = entry.refcount,
                    "released shared mount"
                );
                return Ok(());
            }
        }

        if let Err(reason) = self.tool.unmount(mountpoint).await {
            tracing::warn!(mountpoint = %mountpoint.display(), reason = %reason, "unmount failed");
            return Err(ExecutorError::UnmountFailed {
                mountpoint: mountpoint.to_path_buf(),
                reason,
            });
        }

        {
            let mut table = self.table.lock();
            table.entries.remove(&key);
            table.by_mountpoint.remove(mountpoint);
        }
        if let Err(e) = tokio::fs::remove_dir(mountpoint).await {
            tracing::debug!(mountpoint = %mountpoint.display(), error = %e, "failed to remove mountpoint");
        }

        tracing::info!(export = %key.target, mountpoint = %mountpoint.display(), "unmounted");
        Ok(())
    }
}

impl std::fmt::Debug for MountExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountExecutor")
            .field("mount_root", &self.inner.mount_root)
            .field("active", &self.inner.table.lock().entries.len())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("no valid kerberos credential")]
    CredentialUnavailable,

    #[error("security flavor '{0}' is not a kerberos flavor")]
    InsecureFlavor(String),

    #[error("failed to prepare mountpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to mount {target}: {reason}")]
    MountFailed { target: String, reason: String },

    #[error("failed to unmount {mountpoint}: {reason}")]
    UnmountFailed { mountpoint: PathBuf, reason: String },

    #[error("no mount at {0}")]
    NotFound(PathBuf),

    #[error("mount operation aborted: {0}")]
    Aborted(String),
}
