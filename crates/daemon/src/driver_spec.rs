//! Driver discovery file
//!
//! Container runtimes find volume drivers by scanning a drivers directory for
//! `<name>.spec` (a bare URL) or `<name>.json` (name, address and optional
//! client TLS settings) files.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Serialize;

pub const DRIVER_NAME: &str = "knfsdriver";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverSpec {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Addr")]
    pub address: String,
    #[serde(rename = "TLSConfig", skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

/// Client-side TLS settings a runtime uses to reach the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TlsConfig {
    #[serde(rename = "InsecureSkipVerify")]
    pub insecure_skip_verify: bool,
    #[serde(rename = "CAFile")]
    pub ca_file: PathBuf,
    #[serde(rename = "CertFile")]
    pub cert_file: PathBuf,
    #[serde(rename = "KeyFile")]
    pub key_file: PathBuf,
}

impl TlsConfig {
    /// Same settings with every file resolved against the working directory.
    pub fn absolute(&self) -> std::io::Result<Self> {
        Ok(Self {
            insecure_skip_verify: self.insecure_skip_verify,
            ca_file: absolute(&self.ca_file)?,
            cert_file: absolute(&self.cert_file)?,
            key_file: absolute(&self.key_file)?,
        })
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

impl DriverSpec {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            name: DRIVER_NAME.to_string(),
            address: advertised_url(listen_addr),
            tls: None,
        }
    }

    /// Advertise an `https://` address along with the client TLS settings.
    pub fn with_tls(mut self, listen_addr: SocketAddr, tls: TlsConfig) -> Self {
        self.address = format!("https://{}", listen_addr);
        self.tls = Some(tls);
        self
    }
}

pub fn advertised_url(listen_addr: SocketAddr) -> String {
    format!("http://{}", listen_addr)
}

/// Write the spec file for `listen_addr` into `drivers_path`, replacing any
/// previous one. Returns the path written.
///
/// TLS settings only travel in the JSON form; the plain form is always a
/// bare `http://` URL.
pub fn write(
    drivers_path: &Path,
    listen_addr: SocketAddr,
    json: bool,
    tls: Option<&TlsConfig>,
) -> Result<PathBuf, DriverSpecError> {
    let mut spec = DriverSpec::new(listen_addr);
    if let (true, Some(tls)) = (json, tls) {
        let tls = tls.absolute().map_err(|source| DriverSpecError::Io {
            path: drivers_path.to_path_buf(),
            source,
        })?;
        spec = spec.with_tls(listen_addr, tls);
    }
    let (path, contents) = if json {
        (
            drivers_path.join(format!("{}.json", DRIVER_NAME)),
            serde_json::to_vec(&spec)?,
        )
    } else {
        (
            drivers_path.join(format!("{}.spec", DRIVER_NAME)),
            spec.address.clone().into_bytes(),
        )
    };

    std::fs::create_dir_all(drivers_path).map_err(|source| DriverSpecError::Io {
        path: drivers_path.to_path_buf(),
        source,
    })?;
    // write-then-rename so a scanner never sees a half-written file
    let staging = path.with_extension("tmp");
    std::fs::write(&staging, contents)
        .and_then(|_| std::fs::rename(&staging, &path))
        .map_err(|source| DriverSpecError::Io {
            path: path.clone(),
            source,
        })?;

    tracing::info!(
        location = %drivers_path.display(),
        name = DRIVER_NAME,
        address = %spec.address,
        "wrote driver spec file"
    );
    Ok(path)
}

#[derive(Debug, thiserror::Error)]
pub enum DriverSpecError {
    #[error("failed to write driver spec {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode driver spec: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn addr() -> SocketAddr {
        "127.0.0.1:9750".parse().unwrap()
    }

    #[test]
    fn test_plain_spec() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), addr(), false, None).unwrap();

        assert_eq!(path, dir.path().join("knfsdriver.spec"));
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "http://127.0.0.1:9750"
        );
    }

    #[test]
    fn test_json_spec() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir.path().join("drivers"), addr(), true, None).unwrap();

        assert_eq!(path.file_name().unwrap(), "knfsdriver.json");
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(value["Name"], "knfsdriver");
        assert_eq!(value["Addr"], "http://127.0.0.1:9750");
        assert!(value.get("TLSConfig").is_none());
    }

    fn tls(dir: &Path) -> TlsConfig {
        TlsConfig {
            insecure_skip_verify: true,
            ca_file: dir.join("ca.pem"),
            cert_file: PathBuf::from("client.pem"),
            key_file: PathBuf::from("certs/client.key"),
        }
    }

    #[test]
    fn test_json_spec_with_tls() {
        let dir = TempDir::new().unwrap();
        let tls = tls(dir.path());
        let path = write(dir.path(), addr(), true, Some(&tls)).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(value["Addr"], "https://127.0.0.1:9750");

        let cwd = std::env::current_dir().unwrap();
        let config = &value["TLSConfig"];
        assert_eq!(config["InsecureSkipVerify"], true);
        assert_eq!(config["CAFile"], dir.path().join("ca.pem").to_str().unwrap());
        assert_eq!(config["CertFile"], cwd.join("client.pem").to_str().unwrap());
        assert_eq!(
            config["KeyFile"],
            cwd.join("certs/client.key").to_str().unwrap()
        );
    }

    #[test]
    fn test_plain_spec_ignores_tls() {
        let dir = TempDir::new().unwrap();
        let tls = tls(dir.path());
        let path = write(dir.path(), addr(), false, Some(&tls)).unwrap();

        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "http://127.0.0.1:9750"
        );
    }

    #[test]
    fn test_rewrite_replaces_previous() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), addr(), false, None).unwrap();
        let path = write(dir.path(), "127.0.0.1:9800".parse().unwrap(), false, None).unwrap();

        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "http://127.0.0.1:9800"
        );
        assert!(!dir.path().join("knfsdriver.tmp").exists());
    }
}
