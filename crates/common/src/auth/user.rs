//! OS user identity resolution

use std::ffi::{CStr, CString, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

/// Upper bound for the getpwnam_r scratch buffer
const MAX_PASSWD_BUFFER: usize = 1 << 20;

/// A resolved system account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

/// Looks up system accounts by name.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve(&self, username: &str) -> Option<UserIdentity>;
}

/// Resolves users through the host's name service switch, so local, LDAP
/// and SSSD accounts are all visible.
///
/// Lookups block in libc and run on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUserResolver;

#[async_trait]
impl UserResolver for SystemUserResolver {
    async fn resolve(&self, username: &str) -> Option<UserIdentity> {
        if username.is_empty() {
            return None;
        }
        let username = username.to_string();
        let lookup = tokio::task::spawn_blocking(move || getpwnam(&username)).await;
        match lookup {
            Ok(Ok(user)) => user,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "user lookup failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "user lookup task failed");
                None
            }
        }
    }
}

/// Look up `username` with `getpwnam_r`, growing the buffer on `ERANGE`.
fn getpwnam(username: &str) -> io::Result<Option<UserIdentity>> {
    let c_name = match CString::new(username) {
        Ok(c_name) => c_name,
        Err(_) => return Ok(None),
    };

    let suggested = unsafe { libc::sysconf(libc::_SC_GETPW_R_SIZE_MAX) };
    let mut buf_len = if suggested > 0 {
        suggested as usize
    } else {
        1024
    };

    loop {
        let mut buf: Vec<libc::c_char> = vec![0; buf_len];
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = unsafe {
            libc::getpwnam_r(
                c_name.as_ptr(),
                &mut pwd,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };

        match rc {
            0 if result.is_null() => return Ok(None),
            0 => return Ok(Some(unsafe { identity(&pwd) })),
            libc::ERANGE if buf_len < MAX_PASSWD_BUFFER => buf_len *= 2,
            // several libcs report a missing entry as an error
            libc::ENOENT | libc::ESRCH | libc::EBADF | libc::EPERM => return Ok(None),
            errno => return Err(io::Error::from_raw_os_error(errno)),
        }
    }
}

/// Copy a filled-in `passwd` record out of libc's buffer.
///
/// # Safety
///
/// `pwd` must have been populated by a successful `getpwnam_r` whose buffer
/// is still alive.
unsafe fn identity(pwd: &libc::passwd) -> UserIdentity {
    let name = if pwd.pw_name.is_null() {
        String::new()
    } else {
        CStr::from_ptr(pwd.pw_name).to_string_lossy().into_owned()
    };
    let home = if pwd.pw_dir.is_null() {
        PathBuf::new()
    } else {
        PathBuf::from(OsStr::from_bytes(CStr::from_ptr(pwd.pw_dir).to_bytes()))
    };
    UserIdentity {
        name,
        uid: pwd.pw_uid,
        gid: pwd.pw_gid,
        home,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_root() {
        let root = SystemUserResolver.resolve("root").await.unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.uid, 0);
        assert_eq!(root.gid, 0);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_users() {
        let resolver = SystemUserResolver;
        assert!(resolver.resolve("knfs-no-such-user-4c1d").await.is_none());
        assert!(resolver.resolve("").await.is_none());
        assert!(resolver.resolve("bad\0name").await.is_none());
    }

    #[test]
    fn test_getpwnam_fills_home() {
        let root = getpwnam("root").unwrap().unwrap();
        assert!(!root.home.as_os_str().is_empty());
    }
}
