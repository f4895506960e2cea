use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use common::auth::PolicyKind;
use common::credential::DEFAULT_TICKET_LIFETIME;
use common::executor::DEFAULT_FSTYPE;

use crate::driver_spec::TlsConfig;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9750";
pub const DEFAULT_MOUNT_DIR: &str = "/tmp/volumes";
pub const DEFAULT_RENEW_LEAD: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    // http server configuration
    /// address the volume API listens on
    pub listen_addr: SocketAddr,

    // discovery
    /// directory to write the driver spec file into,
    ///  if not set no spec file is written
    pub drivers_path: Option<PathBuf>,
    /// write `knfsdriver.json` instead of the plain `knfsdriver.spec`
    pub json_spec: bool,
    /// advertise an `https://` address and client TLS files in the JSON spec
    pub require_tls: bool,
    pub insecure_skip_verify: bool,
    pub ca_file: PathBuf,
    pub client_cert_file: PathBuf,
    pub client_key_file: PathBuf,

    // mount configuration
    /// directory under which all mountpoints are created
    pub mount_dir: PathBuf,
    pub mount_program: PathBuf,
    pub umount_program: PathBuf,
    /// filesystem type handed to `mount -t`
    pub fstype: String,

    // kerberos configuration
    pub principal: String,
    pub keytab: PathBuf,
    /// credential cache for kinit, the system default if not set
    pub ccache: Option<String>,
    pub kinit_program: PathBuf,
    pub ticket_lifetime: Duration,
    /// renew once the ticket is this close to expiring
    pub renew_lead: Duration,
    /// how often the renewal task wakes up
    pub renew_interval: Duration,

    // authorization
    pub policy: PolicyKind,
    /// users (names or uids) for the allow-list policy
    pub allowed_users: Vec<String>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9750)),
            drivers_path: None,
            json_spec: false,
            require_tls: false,
            insecure_skip_verify: false,
            ca_file: PathBuf::new(),
            client_cert_file: PathBuf::new(),
            client_key_file: PathBuf::new(),
            mount_dir: PathBuf::from(DEFAULT_MOUNT_DIR),
            mount_program: PathBuf::from("mount"),
            umount_program: PathBuf::from("umount"),
            fstype: DEFAULT_FSTYPE.to_string(),
            principal: String::new(),
            keytab: PathBuf::new(),
            ccache: None,
            kinit_program: PathBuf::from("kinit"),
            ticket_lifetime: DEFAULT_TICKET_LIFETIME,
            renew_lead: DEFAULT_RENEW_LEAD,
            renew_interval: DEFAULT_RENEW_INTERVAL,
            policy: PolicyKind::default(),
            allowed_users: Vec::new(),
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}

impl Config {
    /// Defaults overlaid with whatever the file sets.
    pub fn from_file(file: FileConfig) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = file.listen_addr {
            config.listen_addr = SocketAddr::from_str(&addr)?;
        }
        if let Some(level) = file.log_level {
            config.log_level = tracing::Level::from_str(&level)
                .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", level)))?;
        }

        config.drivers_path = file.drivers_path.or(config.drivers_path);
        config.json_spec = file.json_spec.unwrap_or(config.json_spec);
        config.require_tls = file.require_tls.unwrap_or(config.require_tls);
        config.insecure_skip_verify = file
            .insecure_skip_verify
            .unwrap_or(config.insecure_skip_verify);
        config.ca_file = file.ca_file.unwrap_or(config.ca_file);
        config.client_cert_file = file.client_cert_file.unwrap_or(config.client_cert_file);
        config.client_key_file = file.client_key_file.unwrap_or(config.client_key_file);
        config.mount_dir = file.mount_dir.unwrap_or(config.mount_dir);
        config.mount_program = file.mount_program.unwrap_or(config.mount_program);
        config.umount_program = file.umount_program.unwrap_or(config.umount_program);
        config.fstype = file.fstype.unwrap_or(config.fstype);
        config.principal = file.principal.unwrap_or(config.principal);
        config.keytab = file.keytab.unwrap_or(config.keytab);
        config.ccache = file.ccache.or(config.ccache);
        config.kinit_program = file.kinit_program.unwrap_or(config.kinit_program);
        if let Some(secs) = file.ticket_lifetime_secs {
            config.ticket_lifetime = Duration::from_secs(secs);
        }
        if let Some(secs) = file.renew_lead_secs {
            config.renew_lead = Duration::from_secs(secs);
        }
        if let Some(secs) = file.renew_interval_secs {
            config.renew_interval = Duration::from_secs(secs);
        }
        config.policy = file.policy.unwrap_or(config.policy);
        config.allowed_users = file.allowed_users.unwrap_or(config.allowed_users);
        config.log_dir = file.log_dir.or(config.log_dir);

        Ok(config)
    }

    /// Reject configurations the service cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.principal.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "a kerberos principal is required".to_string(),
            ));
        }
        if self.keytab.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("a keytab path is required".to_string()));
        }
        if self.ticket_lifetime.is_zero() || self.renew_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "ticket lifetime and renew interval must be non-zero".to_string(),
            ));
        }
        if self.renew_lead >= self.ticket_lifetime {
            return Err(ConfigError::Invalid(format!(
                "renew lead ({}s) must be shorter than the ticket lifetime ({}s)",
                self.renew_lead.as_secs(),
                self.ticket_lifetime.as_secs()
            )));
        }
        if self.require_tls {
            if self.ca_file.as_os_str().is_empty()
                || self.client_cert_file.as_os_str().is_empty()
                || self.client_key_file.as_os_str().is_empty()
            {
                return Err(ConfigError::Invalid(
                    "TLS requires a CA file, client certificate and client key".to_string(),
                ));
            }
            if !self.json_spec {
                tracing::warn!("TLS settings are only advertised in the JSON driver spec");
            }
        }
        if self.policy == PolicyKind::AllowList && self.allowed_users.is_empty() {
            tracing::warn!("allow-list policy configured with no users, every mount will be denied");
        }
        Ok(())
    }

    /// Client TLS settings to advertise, if TLS is required.
    pub fn spec_tls(&self) -> Option<TlsConfig> {
        self.require_tls.then(|| TlsConfig {
            insecure_skip_verify: self.insecure_skip_verify,
            ca_file: self.ca_file.clone(),
            cert_file: self.client_cert_file.clone(),
            key_file: self.client_key_file.clone(),
        })
    }
}

/// On-disk TOML configuration. Every field is optional.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub listen_addr: Option<String>,
    pub drivers_path: Option<PathBuf>,
    pub json_spec: Option<bool>,
    pub require_tls: Option<bool>,
    pub insecure_skip_verify: Option<bool>,
    pub ca_file: Option<PathBuf>,
    pub client_cert_file: Option<PathBuf>,
    pub client_key_file: Option<PathBuf>,
    pub mount_dir: Option<PathBuf>,
    pub mount_program: Option<PathBuf>,
    pub umount_program: Option<PathBuf>,
    pub fstype: Option<String>,
    pub principal: Option<String>,
    pub keytab: Option<PathBuf>,
    pub ccache: Option<String>,
    pub kinit_program: Option<PathBuf>,
    pub ticket_lifetime_secs: Option<u64>,
    pub renew_lead_secs: Option<u64>,
    pub renew_interval_secs: Option<u64>,
    pub policy: Option<PolicyKind>,
    pub allowed_users: Option<Vec<String>>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid listen address: {0}")]
    ListenAddr(#[from] std::net::AddrParseError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
