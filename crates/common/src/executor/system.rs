use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use super::{render_options, MountOptions, MountTool};

/// Filesystem type passed to `mount -t`
pub const DEFAULT_FSTYPE: &str = "nfs4";

/// Mounts with the host's `mount` and `umount` binaries.
#[derive(Debug, Clone)]
pub struct SystemMountTool {
    mount: PathBuf,
    umount: PathBuf,
    fstype: String,
    // KRB5CCNAME for the mount helpers, so they see kinit's ticket
    ccache: Option<String>,
}

impl Default for SystemMountTool {
    fn default() -> Self {
        Self {
            mount: PathBuf::from("mount"),
            umount: PathBuf::from("umount"),
            fstype: DEFAULT_FSTYPE.to_string(),
            ccache: None,
        }
    }
}

impl SystemMountTool {
    pub fn new(mount: impl Into<PathBuf>, umount: impl Into<PathBuf>) -> Self {
        Self {
            mount: mount.into(),
            umount: umount.into(),
            ..Self::default()
        }
    }

    pub fn with_fstype(mut self, fstype: impl Into<String>) -> Self {
        self.fstype = fstype.into();
        self
    }

    /// Run `mount` and `umount` against the credential cache kinit writes
    /// to. `None` keeps the process default.
    pub fn with_ccache(mut self, ccache: Option<String>) -> Self {
        self.ccache = ccache;
        self
    }

    fn command(&self, program: &Path) -> Command {
        let mut command = Command::new(program);
        if let Some(ccache) = &self.ccache {
            command.env("KRB5CCNAME", ccache);
        }
        command
    }
}

/// Turn a finished command into the tool's error text.
fn check(program: &Path, output: Output) -> Result<(), String> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        Err(format!("{} exited with {}", program.display(), output.status))
    } else {
        Err(stderr)
    }
}

#[async_trait]
impl MountTool for SystemMountTool {
    async fn mount(
        &self,
        target: &str,
        mountpoint: &Path,
        options: &MountOptions,
    ) -> Result<(), String> {
        let mut command = self.command(&self.mount);
        command.arg("-t").arg(&self.fstype);
        if !options.is_empty() {
            command.arg("-o").arg(render_options(options));
        }
        command.arg(target).arg(mountpoint);

        tracing::debug!(
            program = %self.mount.display(),
            export = %target,
            mountpoint = %mountpoint.display(),
            options = %render_options(options),
            "running mount"
        );
        let output = command
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.mount.display(), e))?;
        check(&self.mount, output)
    }

    async fn unmount(&self, mountpoint: &Path) -> Result<(), String> {
        tracing::debug!(
            program = %self.umount.display(),
            mountpoint = %mountpoint.display(),
            "running umount"
        );
        let output = self
            .command(&self.umount)
            .arg(mountpoint)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.umount.display(), e))?;
        check(&self.umount, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_commands() {
        let tool = SystemMountTool::new("true", "true");
        let options: MountOptions = [("sec".to_string(), "krb5".to_string())].into();

        tool.mount("nfs.example.com:/export", Path::new("/tmp/x"), &options)
            .await
            .unwrap();
        tool.unmount(Path::new("/tmp/x")).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_commands_report_exit_status() {
        let tool = SystemMountTool::new("false", "false").with_fstype("nfs");

        let err = tool
            .mount("nfs.example.com:/export", Path::new("/tmp/x"), &MountOptions::new())
            .await
            .unwrap_err();
        assert!(err.contains("exited with"));

        let err = tool.unmount(Path::new("/tmp/x")).await.unwrap_err();
        assert!(err.contains("false"));
    }

    #[tokio::test]
    async fn test_commands_use_configured_ccache() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let seen = dir.path().join("seen");
        let script = dir.path().join("record-ccache");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$KRB5CCNAME\" >> {}\n", seen.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tool = SystemMountTool::new(&script, &script)
            .with_ccache(Some("FILE:/var/run/knfs/krb5cc".to_string()));
        tool.mount("nfs.example.com:/export", Path::new("/tmp/x"), &MountOptions::new())
            .await
            .unwrap();
        tool.unmount(Path::new("/tmp/x")).await.unwrap();

        let recorded = std::fs::read_to_string(&seen).unwrap();
        assert_eq!(
            recorded.lines().collect::<Vec<_>>(),
            vec!["FILE:/var/run/knfs/krb5cc"; 2]
        );
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let tool = SystemMountTool::new("/nonexistent/mount", "/nonexistent/umount");
        let err = tool.unmount(Path::new("/tmp/x")).await.unwrap_err();
        assert!(err.starts_with("failed to run"));
    }
}
