//! Connectivity bootstrap run once before any sensing task starts.
//!
//! Storage is brought up first (a corrupted partition is erased and
//! reinitialised exactly once), the device identity is applied, and the
//! network association is awaited for a bounded number of fixed-interval wait
//! cycles. Exhausting the budget is fatal: the caller restarts the device.

mod host;

pub use host::{HostDevice, HostNetwork, HostStorage};

use crate::clock::Sleeper;
use anyhow::{Context, Result};
use std::convert::Infallible;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Network credentials. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub enum StorageError {
    /// Layout is unreadable or from another version; recoverable by erasing.
    Corrupted(String),
    Other(anyhow::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Corrupted(reason) => write!(f, "storage corrupted: {reason}"),
            StorageError::Other(err) => write!(f, "storage unavailable: {err:#}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Persistent key-value storage.
pub trait Storage {
    fn init(&mut self) -> Result<(), StorageError>;
    fn erase(&mut self) -> Result<()>;
}

/// Network interface.
pub trait Network {
    fn mac_address(&self) -> String;
    fn set_hostname(&mut self, hostname: &str) -> Result<()>;
    /// Begin association. Completion is observed through `is_connected`.
    fn connect(&mut self, credentials: &Credentials) -> Result<()>;
    fn is_connected(&mut self) -> bool;
}

/// Hard reset of the whole device.
pub trait DeviceControl {
    /// Does not return on success.
    fn restart(&mut self) -> Result<Infallible>;
}

/// Bound on how long the bootstrap waits for association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(5),
        }
    }
}

/// Wait cycles spent so far. Lives only for the duration of the bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryState {
    attempt_count: u32,
    max_attempts: u32,
}

impl RetryState {
    fn exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Associated after `waits` wait cycles.
    Connected { waits: u32 },
    /// Budget exhausted after `waits` wait cycles; the device must restart.
    Fatal { waits: u32 },
}

/// Bring up storage, apply the hostname, then wait for the network.
///
/// Errors are reserved for storage that stays broken after one erase, or a
/// hostname the interface refuses. Neither restarts the device.
pub fn bootstrap<St, N, Sl>(
    storage: &mut St,
    network: &mut N,
    sleeper: &mut Sl,
    credentials: &Credentials,
    hostname: &str,
    policy: RetryPolicy,
) -> Result<BootstrapOutcome>
where
    St: Storage + ?Sized,
    N: Network + ?Sized,
    Sl: Sleeper + ?Sized,
{
    info!("initializing storage");
    init_storage(storage)?;

    network
        .set_hostname(hostname)
        .with_context(|| format!("failed to set hostname '{hostname}'"))?;
    info!(
        hostname,
        mac = %network.mac_address(),
        ssid = %credentials.ssid,
        "connecting to network"
    );
    if let Err(err) = network.connect(credentials) {
        warn!("network association request failed: {err:#}");
    }

    let mut retry = RetryState {
        attempt_count: 0,
        max_attempts: policy.max_attempts,
    };
    loop {
        if network.is_connected() {
            info!(waits = retry.attempt_count, "network connected");
            return Ok(BootstrapOutcome::Connected {
                waits: retry.attempt_count,
            });
        }
        if retry.exhausted() {
            error!(
                waits = retry.attempt_count,
                "could not connect to network; restarting"
            );
            return Ok(BootstrapOutcome::Fatal {
                waits: retry.attempt_count,
            });
        }
        info!(
            attempt = retry.attempt_count + 1,
            max = retry.max_attempts,
            "waiting for network connection"
        );
        sleeper.sleep(policy.interval);
        retry.attempt_count += 1;
    }
}

/// Startup gate: returns the wait cycles spent once the network is up.
///
/// Only an exhausted retry budget restarts the device. Any other bootstrap
/// error is returned so the process can report it and exit.
pub fn connect_or_restart(
    storage: &mut dyn Storage,
    network: &mut dyn Network,
    sleeper: &mut dyn Sleeper,
    device: &mut dyn DeviceControl,
    credentials: &Credentials,
    hostname: &str,
    policy: RetryPolicy,
) -> Result<u32> {
    match bootstrap(storage, network, sleeper, credentials, hostname, policy)? {
        BootstrapOutcome::Connected { waits } => Ok(waits),
        BootstrapOutcome::Fatal { .. } => match device.restart()? {},
    }
}

fn init_storage<St: Storage + ?Sized>(storage: &mut St) -> Result<()> {
    match storage.init() {
        Ok(()) => Ok(()),
        Err(StorageError::Corrupted(reason)) => {
            warn!(%reason, "storage corrupted; erasing and reinitializing");
            storage.erase().context("failed to erase storage")?;
            storage
                .init()
                .map_err(anyhow::Error::new)
                .context("storage still unusable after erase")
        }
        Err(StorageError::Other(err)) => Err(err.context("failed to initialize storage")),
    }
}
