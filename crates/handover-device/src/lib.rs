mod command;
mod resolve;

pub use command::{CommandProbe, DEFAULT_INFO_PROGRAM, DEFAULT_LIST_PROGRAM};
pub use resolve::{
    IdentityResolver, Resolution, ResolveEvent, RetryPolicy, Sleeper, ThreadSleeper,
};

use handover_core::normalize_serial;
use std::fmt;
use std::io;
use thiserror::Error;
use tracing::{debug, warn};

/// Text `ideviceinfo` prints while the device still shows the
/// "Trust This Computer" dialog.
pub const TRUST_PENDING_MARKER: &str = "Pairing dialog response pending";

const SERIAL_PREFIX: &str = "SerialNumber:";

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} failed: {details}")]
    Command { program: String, details: String },
    #[error("device {handle} is waiting for the trust dialog to be answered")]
    TrustPending { handle: String },
    #[error("device {handle} reported no serial number")]
    MissingSerial { handle: String },
}

/// Access to attached hardware: enumeration of connection handles and the
/// per-device info dump.
pub trait DeviceProbe {
    fn list_handles(&self) -> Result<Vec<String>, DeviceError>;

    fn query_info(&self, handle: &str) -> Result<String, DeviceError>;
}

impl<P: DeviceProbe + ?Sized> DeviceProbe for &P {
    fn list_handles(&self) -> Result<Vec<String>, DeviceError> {
        (**self).list_handles()
    }

    fn query_info(&self, handle: &str) -> Result<String, DeviceError> {
        (**self).query_info(handle)
    }
}

/// One attached unit, known only by its transport handle until resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedDevice {
    pub handle: String,
}

impl fmt::Display for ConnectedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.handle)
    }
}

/// Enumerates attached devices. Probe failures are logged and read as "no
/// devices".
pub fn list_connected<P: DeviceProbe + ?Sized>(probe: &P) -> Vec<ConnectedDevice> {
    match probe.list_handles() {
        Ok(handles) => {
            let devices: Vec<ConnectedDevice> = handles
                .into_iter()
                .map(|handle| handle.trim().to_string())
                .filter(|handle| !handle.is_empty())
                .map(|handle| ConnectedDevice { handle })
                .collect();
            debug!(event = "devices_listed", count = devices.len());
            devices
        }
        Err(err) => {
            warn!(event = "enumeration_failed", error = %err);
            Vec::new()
        }
    }
}

/// Pulls the serial number out of an info dump, normalized.
pub fn parse_serial(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.strip_prefix(SERIAL_PREFIX))
        .map(normalize_serial)
        .filter(|serial| !serial.is_empty())
}

pub fn is_trust_pending(details: &str) -> bool {
    details.contains(TRUST_PENDING_MARKER)
}
