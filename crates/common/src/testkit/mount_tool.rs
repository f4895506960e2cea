use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::executor::{MountOptions, MountTool};

/// One call made to [`FakeMountTool::mount`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub target: String,
    pub mountpoint: PathBuf,
    pub options: MountOptions,
}

/// Records mount and unmount requests instead of touching the OS.
#[derive(Debug, Default)]
pub struct FakeMountTool {
    delay: Mutex<Option<Duration>>,
    mount_failure: Mutex<Option<String>>,
    unmount_failure: Mutex<Option<String>>,
    mounts: Mutex<Vec<MountRecord>>,
    unmounts: Mutex<Vec<PathBuf>>,
    // calls currently inside the tool, and the most seen at once
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeMountTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn fail_mounts(&self, reason: &str) {
        *self.mount_failure.lock() = Some(reason.to_string());
    }

    pub fn fail_unmounts(&self, reason: &str) {
        *self.unmount_failure.lock() = Some(reason.to_string());
    }

    pub fn clear_failures(&self) {
        *self.mount_failure.lock() = None;
        *self.unmount_failure.lock() = None;
    }

    /// Number of mount attempts, failed ones included.
    pub fn mount_calls(&self) -> usize {
        self.mounts.lock().len()
    }

    pub fn unmount_calls(&self) -> usize {
        self.unmounts.lock().len()
    }

    pub fn mounts(&self) -> Vec<MountRecord> {
        self.mounts.lock().clone()
    }

    pub fn unmounts(&self) -> Vec<PathBuf> {
        self.unmounts.lock().clone()
    }

    /// Most calls that were ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MountTool for FakeMountTool {
    async fn mount(
        &self,
        target: &str,
        mountpoint: &Path,
        options: &MountOptions,
    ) -> Result<(), String> {
        self.enter().await;
        self.mounts.lock().push(MountRecord {
            target: target.to_string(),
            mountpoint: mountpoint.to_path_buf(),
            options: options.clone(),
        });
        let result = match self.mount_failure.lock().clone() {
            Some(reason) => Err(reason),
            None => Ok(()),
        };
        self.exit();
        result
    }

    async fn unmount(&self, mountpoint: &Path) -> Result<(), String> {
        self.enter().await;
        self.unmounts.lock().push(mountpoint.to_path_buf());
        let result = match self.unmount_failure.lock().clone() {
            Some(reason) => Err(reason),
            None => Ok(()),
        };
        self.exit();
        result
    }
}
