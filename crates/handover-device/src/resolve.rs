use crate::{parse_serial, ConnectedDevice, DeviceError, DeviceProbe};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total info queries per device, the first one included.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    /// Every attempt failed; the device is skipped for this cycle.
    Unresolved { attempts: u32 },
}

impl Resolution {
    pub fn serial(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(serial) => Some(serial),
            Resolution::Unresolved { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum ResolveEvent<'a> {
    AttemptFailed {
        handle: &'a str,
        attempt: u32,
        error: &'a DeviceError,
    },
    RetryScheduled {
        handle: &'a str,
        delay: Duration,
        remaining: u32,
    },
}

pub struct IdentityResolver<P, S> {
    probe: P,
    sleeper: S,
    policy: RetryPolicy,
}

impl<P: DeviceProbe, S: Sleeper> IdentityResolver<P, S> {
    pub fn new(probe: P, sleeper: S, policy: RetryPolicy) -> Self {
        Self {
            probe,
            sleeper,
            policy,
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn resolve(&self, device: &ConnectedDevice) -> Resolution {
        self.resolve_with(device, |_| {})
    }

    /// Queries the device until a serial number comes back or the attempt
    /// budget runs out, sleeping `policy.delay` between attempts.
    pub fn resolve_with<F>(&self, device: &ConnectedDevice, mut on_event: F) -> Resolution
    where
        F: FnMut(ResolveEvent<'_>),
    {
        let attempts = self.policy.max_attempts.max(1);
        let handle = device.handle.as_str();

        for attempt in 1..=attempts {
            let error = match self.probe.query_info(handle) {
                Ok(info) => match parse_serial(&info) {
                    Some(serial) => {
                        debug!(event = "serial_resolved", handle = %handle, serial = %serial, attempt);
                        return Resolution::Resolved(serial);
                    }
                    None => DeviceError::MissingSerial {
                        handle: handle.to_string(),
                    },
                },
                Err(err) => err,
            };

            warn!(event = "serial_query_failed", handle = %handle, attempt, error = %error);
            on_event(ResolveEvent::AttemptFailed {
                handle,
                attempt,
                error: &error,
            });

            let remaining = attempts - attempt;
            if remaining > 0 {
                on_event(ResolveEvent::RetryScheduled {
                    handle,
                    delay: self.policy.delay,
                    remaining,
                });
                self.sleeper.sleep(self.policy.delay);
            }
        }

        Resolution::Unresolved { attempts }
    }
}
