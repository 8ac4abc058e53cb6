//! Service - Registry
//! ==================
//!
//! Creates and deletes service definitions.
//!
//! * **Windows** – entries in the Service Control Manager database
//!   (`CreateServiceW` / `DeleteService`), own-process, errors ignored.
//! * **Unix** – systemd user units `<name>.service` written into a unit
//!   directory. Nothing is enabled or started; `systemctl` is left to the
//!   operator.

use std::path::{Path, PathBuf};

use bon::Builder;

use super::error::*;
use crate::process::OsError;

#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StartType {
    Auto = 2,
    Demand = 3,
    Disabled = 4,
}

impl TryFrom<i64> for StartType {
    type Error = ServiceError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            2 => Ok(Self::Auto),
            3 => Ok(Self::Demand),
            4 => Ok(Self::Disabled),
            value => Err(ServiceError::InvalidStartType { value }),
        }
    }
}

#[derive(serde::Serialize, Debug, Clone, PartialEq, Eq, Builder)]
pub struct ServiceDefinition {
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub description: String,
    #[builder(into)]
    pub command_line: String,
    pub start_type: StartType,
}

/// Handle on the service database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRegistry {
    unit_dir: Option<PathBuf>,
}

impl ServiceRegistry {
    pub fn system() -> Self {
        Self::default()
    }

    /// Uses `dir` for unit files instead of the per-user systemd directory.
    /// Ignored on Windows.
    pub fn with_unit_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: Some(dir.into()),
        }
    }

    pub fn unit_dir(&self) -> Option<&Path> {
        self.unit_dir.as_deref()
    }
}

#[cfg(unix)]
impl ServiceRegistry {
    pub fn register(&self, definition: &ServiceDefinition) -> std::result::Result<(), OsError> {
        use std::io::Write;

        let dir = self.resolve_dir()?;
        let path = dir.join(unit_file_name(&definition.name)?);
        std::fs::create_dir_all(&dir).map_err(|e| OsError::from_io(&e))?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| OsError::from_io(&e))?;
        file.write_all(render_unit(definition).as_bytes())
            .map_err(|e| OsError::from_io(&e))?;

        crate::info!("Registered service '{}' at {}", definition.name, path.display());
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> std::result::Result<(), OsError> {
        let path = self.resolve_dir()?.join(unit_file_name(name)?);
        std::fs::remove_file(&path).map_err(|e| OsError::from_io(&e))?;
        crate::info!("Unregistered service '{name}' ({})", path.display());
        Ok(())
    }

    fn resolve_dir(&self) -> std::result::Result<PathBuf, OsError> {
        if let Some(dir) = &self.unit_dir {
            return Ok(dir.clone());
        }
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("systemd").join("user"))
            .ok_or_else(|| OsError::from(nix::errno::Errno::ENOENT))
    }
}

#[cfg(unix)]
fn unit_file_name(name: &str) -> std::result::Result<String, OsError> {
    let sanitized = sanitize_filename::sanitize(name);
    if sanitized.is_empty() {
        return Err(OsError::invalid_parameter());
    }
    Ok(format!("{sanitized}.service"))
}

#[cfg(unix)]
fn render_unit(definition: &ServiceDefinition) -> String {
    let mut unit = String::new();
    if definition.start_type == StartType::Disabled {
        unit.push_str("# disabled: not to be enabled or started\n");
    }
    unit.push_str(&format!(
        "[Unit]\nDescription={}\n\n[Service]\nType=simple\nExecStart={}\n",
        definition.description, definition.command_line
    ));
    if definition.start_type == StartType::Auto {
        unit.push_str("\n[Install]\nWantedBy=default.target\n");
    }
    unit
}

#[cfg(windows)]
impl ServiceRegistry {
    pub fn register(&self, definition: &ServiceDefinition) -> std::result::Result<(), OsError> {
        use windows::{
            Win32::System::Services::{
                CloseServiceHandle, CreateServiceW, OpenSCManagerW, SC_MANAGER_ALL_ACCESS,
                SERVICE_ALL_ACCESS, SERVICE_ERROR_IGNORE, SERVICE_START_TYPE,
                SERVICE_WIN32_OWN_PROCESS,
            },
            core::PCWSTR,
        };

        let name = wide(&definition.name);
        let display = wide(&definition.description);
        let command = wide(&definition.command_line);
        let password = wide("");

        unsafe {
            let scm = OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), SC_MANAGER_ALL_ACCESS)
                .map_err(|e| OsError::from_win(&e))?;
            let created = CreateServiceW(
                scm,
                PCWSTR(name.as_ptr()),
                PCWSTR(display.as_ptr()),
                SERVICE_ALL_ACCESS,
                SERVICE_WIN32_OWN_PROCESS,
                SERVICE_START_TYPE(definition.start_type as u32),
                SERVICE_ERROR_IGNORE,
                PCWSTR(command.as_ptr()),
                PCWSTR::null(),
                None,
                PCWSTR::null(),
                PCWSTR::null(),
                PCWSTR(password.as_ptr()),
            );
            let result = match created {
                Ok(service) => {
                    let _ = CloseServiceHandle(service);
                    Ok(())
                }
                Err(e) => Err(OsError::from_win(&e)),
            };
            let _ = CloseServiceHandle(scm);
            result
        }
    }

    pub fn unregister(&self, name: &str) -> std::result::Result<(), OsError> {
        use windows::{
            Win32::System::Services::{
                CloseServiceHandle, DeleteService, OpenSCManagerW, OpenServiceW,
                SC_MANAGER_ALL_ACCESS, SERVICE_ALL_ACCESS,
            },
            core::PCWSTR,
        };

        let name = wide(name);
        unsafe {
            let scm = OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), SC_MANAGER_ALL_ACCESS)
                .map_err(|e| OsError::from_win(&e))?;
            let result = match OpenServiceW(scm, PCWSTR(name.as_ptr()), SERVICE_ALL_ACCESS) {
                Ok(service) => {
                    let deleted = DeleteService(service).map_err(|e| OsError::from_win(&e));
                    let _ = CloseServiceHandle(service);
                    deleted
                }
                Err(e) => Err(OsError::from_win(&e)),
            };
            let _ = CloseServiceHandle(scm);
            result
        }
    }
}

#[cfg(windows)]
fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}
