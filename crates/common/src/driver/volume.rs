use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv6Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::executor::{MountOptions, KERBEROS_FLAVORS, SECURITY_OPTION};

/// Create option naming the remote export
pub const SOURCE_OPTION: &str = "source";
/// Create option naming the volume's designated owner
pub const OWNER_OPTION: &str = "owner";

/// A named volume as the driver tracks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    /// Remote export, `host:/path`
    pub mount_target: String,
    pub mount_opts: MountOptions,
    pub owner: Option<String>,
    /// Set exactly while `refcount > 0`
    pub mountpoint: Option<PathBuf>,
    pub refcount: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeState {
    Created,
    Mounted,
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeState::Created => f.write_str("created"),
            VolumeState::Mounted => f.write_str("mounted"),
        }
    }
}

impl Volume {
    pub fn new(
        name: impl Into<String>,
        mount_target: impl Into<String>,
        mount_opts: MountOptions,
        owner: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mount_target: mount_target.into(),
            mount_opts,
            owner,
            mountpoint: None,
            refcount: 0,
        }
    }

    pub fn state(&self) -> VolumeState {
        if self.refcount > 0 {
            VolumeState::Mounted
        } else {
            VolumeState::Created
        }
    }

    pub fn info(&self) -> VolumeInfo {
        VolumeInfo {
            name: self.name.clone(),
            target: self.mount_target.clone(),
            options: self.mount_opts.clone(),
            owner: self.owner.clone(),
            mountpoint: self.mountpoint.clone(),
            refcount: self.refcount,
            state: self.state(),
        }
    }
}

/// Read-only snapshot of a volume, as returned by Get and List.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub name: String,
    pub target: String,
    pub options: MountOptions,
    pub owner: Option<String>,
    pub mountpoint: Option<PathBuf>,
    pub refcount: usize,
    pub state: VolumeState,
}

/// Create options, split into what the driver understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    pub target: String,
    pub mount_opts: MountOptions,
    pub owner: Option<String>,
}

pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("volume name must not be empty".to_string());
    }
    if name.contains('/') || name.chars().any(char::is_whitespace) || name == "." || name == ".." {
        return Err(format!("invalid volume name '{}'", name));
    }
    Ok(())
}

/// Split raw create options into the export, owner and mount options.
pub fn parse_create_options(opts: &BTreeMap<String, String>) -> Result<CreateOptions, String> {
    let source = opts
        .get(SOURCE_OPTION)
        .ok_or_else(|| format!("missing required option '{}'", SOURCE_OPTION))?;
    let (target, port) = parse_source(source)?;

    let owner = match opts.get(OWNER_OPTION) {
        Some(owner) if owner.trim().is_empty() || owner.contains(':') => {
            return Err(format!("invalid owner '{}'", owner))
        }
        Some(owner) => Some(owner.clone()),
        None => None,
    };

    let mut mount_opts = MountOptions::new();
    for (key, value) in opts {
        if key == SOURCE_OPTION || key == OWNER_OPTION {
            continue;
        }
        validate_option(key, value)?;
        mount_opts.insert(key.clone(), value.clone());
    }
    if let Some(port) = port {
        mount_opts.entry("port".to_string()).or_insert(port);
    }
    if let Some(flavor) = mount_opts.get(SECURITY_OPTION) {
        if !KERBEROS_FLAVORS.contains(&flavor.as_str()) {
            return Err(format!(
                "security flavor '{}' is not allowed, use one of {}",
                flavor,
                KERBEROS_FLAVORS.join(", ")
            ));
        }
    }

    Ok(CreateOptions {
        target,
        mount_opts,
        owner,
    })
}

fn validate_option(key: &str, value: &str) -> Result<(), String> {
    let key_ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if !key_ok {
        return Err(format!("invalid mount option name '{}'", key));
    }
    if value
        .chars()
        .any(|c| c == ',' || c == '=' || c.is_whitespace() || c.is_control())
    {
        return Err(format!("invalid value for mount option '{}'", key));
    }
    Ok(())
}

/// Resolve `nfs://host[:port]/path` or `host:/path` to a mount target and an
/// optional port. IPv6 hosts are written in brackets in both forms.
pub fn parse_source(source: &str) -> Result<(String, Option<String>), String> {
    let invalid = || format!("invalid source '{}', expected nfs://host/path or host:/path", source);
    if source.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid());
    }

    if source.starts_with("nfs://") {
        let url = Url::parse(source).map_err(|_| invalid())?;
        let host = url.host_str().filter(|host| !host.is_empty()).ok_or_else(invalid)?;
        if !url.username().is_empty()
            || url.password().is_some()
            || url.query().is_some()
            || url.fragment().is_some()
            || url.path().contains('%')
        {
            return Err(invalid());
        }
        let path = match url.path() {
            "" => "/",
            path => path,
        };
        return Ok((
            format!("{}:{}", host, path),
            url.port().map(|port| port.to_string()),
        ));
    }

    let split = match source.strip_prefix('[') {
        Some(rest) => rest
            .split_once("]:")
            .filter(|(addr, _)| addr.parse::<Ipv6Addr>().is_ok())
            .map(|(addr, path)| (&source[..addr.len() + 2], path)),
        None => source.split_once(':'),
    };
    match split {
        Some((host, path)) if !host.is_empty() && !host.contains('/') && path.starts_with('/') => {
            Ok((source.to_string(), None))
        }
        _ => Err(invalid()),
    }
}
