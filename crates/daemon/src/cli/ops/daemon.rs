use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

use common::auth::PolicyKind;
use knfs_daemon::service_config::{ConfigError, FileConfig};
use knfs_daemon::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// TOML config file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// host:port to serve volume management functions on
    #[arg(long)]
    pub listen_addr: Option<SocketAddr>,

    /// Directory where the driver spec file is written
    #[arg(long)]
    pub drivers_path: Option<PathBuf>,

    /// Write a JSON driver spec instead of a plain URL
    #[arg(long)]
    pub json_spec: bool,

    /// Advertise an https address and client TLS files in the JSON spec
    #[arg(long)]
    pub require_tls: bool,

    /// CA certificate clients verify the driver with
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// Client certificate for talking to the driver
    #[arg(long)]
    pub client_cert_file: Option<PathBuf>,

    /// Client key for talking to the driver
    #[arg(long)]
    pub client_key_file: Option<PathBuf>,

    /// Let clients skip server certificate verification
    #[arg(long)]
    pub insecure_skip_verify: bool,

    /// Directory under which volumes are mounted
    #[arg(long)]
    pub mount_dir: Option<PathBuf>,

    /// Kerberos principal of the service account
    #[arg(long)]
    pub kerberos_principal: Option<String>,

    /// Keytab holding the principal's key
    #[arg(long)]
    pub keytab: Option<PathBuf>,

    /// Authorization policy: allow-any, owner or allow-list
    #[arg(long)]
    pub policy: Option<PolicyKind>,

    /// User name or uid for the allow-list policy (repeatable)
    #[arg(long = "allow-user")]
    pub allow_users: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<tracing::Level>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl Daemon {
    /// File (or built-in defaults) with flags laid on top.
    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let mut config = ServiceConfig::from_file(file)?;

        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(path) = &self.drivers_path {
            config.drivers_path = Some(path.clone());
        }
        if self.json_spec {
            config.json_spec = true;
        }
        if self.require_tls {
            config.require_tls = true;
        }
        if self.insecure_skip_verify {
            config.insecure_skip_verify = true;
        }
        if let Some(path) = &self.ca_file {
            config.ca_file = path.clone();
        }
        if let Some(path) = &self.client_cert_file {
            config.client_cert_file = path.clone();
        }
        if let Some(path) = &self.client_key_file {
            config.client_key_file = path.clone();
        }
        if let Some(dir) = &self.mount_dir {
            config.mount_dir = dir.clone();
        }
        if let Some(principal) = &self.kerberos_principal {
            config.principal = principal.clone();
        }
        if let Some(keytab) = &self.keytab {
            config.keytab = keytab.clone();
        }
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if !self.allow_users.is_empty() {
            config.allowed_users = self.allow_users.clone();
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }

        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = self.service_config()?;
        config.validate()?;

        spawn_service(&config).await;
        Ok("daemon ended".to_string())
    }
}
