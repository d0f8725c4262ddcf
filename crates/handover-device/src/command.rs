use crate::{is_trust_pending, DeviceError, DeviceProbe};
use std::process::{Command, Output, Stdio};

pub const DEFAULT_LIST_PROGRAM: &str = "idevice_id";
pub const DEFAULT_INFO_PROGRAM: &str = "ideviceinfo";

/// Probe backed by the libimobiledevice command-line tools.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    list_program: String,
    info_program: String,
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self::new(DEFAULT_LIST_PROGRAM, DEFAULT_INFO_PROGRAM)
    }
}

impl CommandProbe {
    pub fn new(list_program: impl Into<String>, info_program: impl Into<String>) -> Self {
        Self {
            list_program: list_program.into(),
            info_program: info_program.into(),
        }
    }

    fn capture(&self, program: &str, args: &[&str]) -> Result<String, DeviceError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DeviceError::Launch {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(DeviceError::Command {
                program: program.to_string(),
                details: failure_details(program, &output),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DeviceProbe for CommandProbe {
    fn list_handles(&self) -> Result<Vec<String>, DeviceError> {
        let stdout = self.capture(&self.list_program, &["-l"])?;
        Ok(stdout.lines().map(str::to_string).collect())
    }

    fn query_info(&self, handle: &str) -> Result<String, DeviceError> {
        match self.capture(&self.info_program, &["-u", handle]) {
            Err(DeviceError::Command { details, .. }) if is_trust_pending(&details) => {
                Err(DeviceError::TrustPending {
                    handle: handle.to_string(),
                })
            }
            other => other,
        }
    }
}

fn failure_details(program: &str, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !stderr.is_empty() {
        stderr
    } else if !stdout.is_empty() {
        stdout
    } else {
        format!("{program} exited with status {}", output.status)
    }
}
