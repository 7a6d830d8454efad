//! Host-side stand-ins for the device's storage, radio and reset line.

use super::{Credentials, DeviceControl, Network, Storage, StorageError};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

const STORAGE_FILE: &str = "storage.json";
const STORAGE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredState {
    version: u32,
    boot_count: u64,
}

/// Versioned JSON record under a state directory.
#[derive(Debug)]
pub struct HostStorage {
    dir: PathBuf,
    boot_count: u64,
}

impl HostStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            boot_count: 0,
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(STORAGE_FILE)
    }

    /// Boots recorded so far, including this one once `init` succeeded.
    pub fn boot_count(&self) -> u64 {
        self.boot_count
    }

    fn read_state(path: &Path) -> Result<StoredState, StorageError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(StoredState {
                    version: STORAGE_VERSION,
                    boot_count: 0,
                })
            }
            Err(err) => {
                return Err(StorageError::Other(
                    anyhow::Error::new(err).context(format!("failed to read {}", path.display())),
                ))
            }
        };
        let state: StoredState = serde_json::from_str(&raw)
            .map_err(|err| StorageError::Corrupted(format!("unreadable record: {err}")))?;
        if state.version != STORAGE_VERSION {
            return Err(StorageError::Corrupted(format!(
                "record version {} found, expected {STORAGE_VERSION}",
                state.version
            )));
        }
        Ok(state)
    }
}

impl Storage for HostStorage {
    fn init(&mut self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            StorageError::Other(
                anyhow::Error::new(err)
                    .context(format!("failed to create {}", self.dir.display())),
            )
        })?;
        let path = self.path();
        let mut state = Self::read_state(&path)?;
        state.boot_count += 1;
        let encoded = serde_json::to_string(&state)
            .map_err(|err| StorageError::Other(anyhow::Error::new(err)))?;
        fs::write(&path, encoded).map_err(|err| {
            StorageError::Other(
                anyhow::Error::new(err).context(format!("failed to write {}", path.display())),
            )
        })?;
        self.boot_count = state.boot_count;
        info!(boot_count = state.boot_count, "storage ready");
        Ok(())
    }

    fn erase(&mut self) -> Result<()> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to erase {}", self.path().display())),
        }
    }
}

/// Split `http(s)://[user@]host[:port]/path` into a `host:port` authority.
pub(crate) fn endpoint_authority(url: &str) -> Result<String> {
    let (rest, default_port) = if let Some(rest) = url.strip_prefix("http://") {
        (rest, 80)
    } else if let Some(rest) = url.strip_prefix("https://") {
        (rest, 443)
    } else {
        bail!("unsupported URL scheme in '{url}'");
    };
    let authority = rest
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or_default();
    if authority.is_empty() {
        bail!("URL '{url}' has no host");
    }
    // A colon after the closing bracket (or anywhere, without brackets) starts a port.
    let host_end = authority.rfind(']').map_or(0, |idx| idx + 1);
    if authority[host_end..].contains(':') {
        Ok(authority.to_string())
    } else {
        Ok(format!("{authority}:{default_port}"))
    }
}

/// Treats "associated" as "the notification endpoint accepts TCP connections".
#[derive(Debug)]
pub struct HostNetwork {
    endpoint: String,
    probe_timeout: Duration,
    hostname: Option<String>,
    requested: bool,
}

impl HostNetwork {
    pub fn for_url(url: &str, probe_timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint_authority(url)?,
            probe_timeout,
            hostname: None,
            requested: false,
        })
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }
}

impl Network for HostNetwork {
    fn mac_address(&self) -> String {
        first_hardware_address().unwrap_or_else(|| "unknown".to_string())
    }

    fn set_hostname(&mut self, hostname: &str) -> Result<()> {
        // The host's own name is left alone; this is the identity we report.
        self.hostname = Some(hostname.to_string());
        Ok(())
    }

    fn connect(&mut self, credentials: &Credentials) -> Result<()> {
        debug!(ssid = %credentials.ssid, endpoint = %self.endpoint, "association requested");
        self.requested = true;
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        if !self.requested {
            return false;
        }
        let addrs = match self.endpoint.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(err) => {
                debug!(endpoint = %self.endpoint, "endpoint lookup failed: {err}");
                return false;
            }
        };
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.probe_timeout) {
                Ok(_) => return true,
                Err(err) => debug!(%addr, "endpoint probe failed: {err}"),
            }
        }
        false
    }
}

fn first_hardware_address() -> Option<String> {
    let entries = fs::read_dir("/sys/class/net").ok()?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "lo")
        .collect();
    names.sort();
    names.into_iter().find_map(|name| {
        let path = Path::new("/sys/class/net").join(name).join("address");
        let address = fs::read_to_string(path).ok()?.trim().to_string();
        (!address.is_empty() && address != "00:00:00:00:00:00").then_some(address)
    })
}

/// Restarts by replacing the current process image with a fresh copy.
#[derive(Debug, Default)]
pub struct HostDevice;

impl DeviceControl for HostDevice {
    #[cfg(unix)]
    fn restart(&mut self) -> Result<Infallible> {
        use std::os::unix::process::CommandExt;
        let exe = env::current_exe().context("cannot locate current executable")?;
        info!(exe = %exe.display(), "restarting");
        let err = Command::new(&exe).args(env::args_os().skip(1)).exec();
        Err(anyhow!(err).context(format!("failed to re-exec {}", exe.display())))
    }

    #[cfg(not(unix))]
    fn restart(&mut self) -> Result<Infallible> {
        let exe = env::current_exe().context("cannot locate current executable")?;
        info!(exe = %exe.display(), "restarting");
        Command::new(&exe)
            .args(env::args_os().skip(1))
            .spawn()
            .with_context(|| format!("failed to relaunch {}", exe.display()))?;
        std::process::exit(0)
    }
}
