//! XmlCli hardware access
//!
//! One capability contract, [`AccessBackend`], over the different ways of reaching a target platform's memory,
//! I/O ports and MSRs:
//!
//! | Access method | Backend | Reaches the target through |
//! |---------------|---------|----------------------------|
//! | `linux`  | [`DirectMemoryBackend`]    | a physical memory device file and optional native helper libraries |
//! | `winrwe` | [`ExternalToolBackend`]    | an external register read/write utility run as a subprocess |
//! | `dci`, `itpii` | [`DebugProbeBackend`] | a hardware debug probe |
//! | `uefi`   | [`FirmwareRuntimeBackend`] | firmware runtime services |
//! | `stub`   | [`NullBackend`]            | nothing (dry runs) |
//!
//! A backend is chosen explicitly with a [`BackendSelection`] and handed to an [`AccessSession`], which serializes
//! hardware access across the process and tracks nested `init_interface`/`close_interface` levels.
//!
//! ## Examples
//!
//! ```rust ignore
//! use xmlcli_access::{open_session, BackendSelection};
//! use xmlcli_sdk::config::AccessConfiguration;
//!
//! let mut session = open_session(BackendSelection::from_name("linux")?, &AccessConfiguration::default())?;
//! session.init_interface()?;
//! let cmos = session.read_io(0x71, 1)?;
//! session.close_interface()?;
//! ```
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
pub mod backend;
pub mod debug_probe;
pub mod direct_memory;
pub mod external_tool;
pub mod firmware_runtime;
pub mod null;
pub mod session;
pub mod window;

pub use backend::AccessBackend;
pub use debug_probe::{DebugProbe, DebugProbeBackend, ThreadPath, ThreadSelector};
pub use direct_memory::DirectMemoryBackend;
pub use external_tool::ExternalToolBackend;
pub use firmware_runtime::{FirmwareRuntime, FirmwareRuntimeBackend};
pub use null::NullBackend;
pub use session::AccessSession;
pub use window::MemoryWindow;

use xmlcli_sdk::{config::AccessConfiguration, AccessError, Result};

/// The access method to construct.
pub enum BackendSelection {
    DirectMemory,
    ExternalTool,
    Null,
    /// A debug probe, with the access method name it is known by.
    DebugProbe { probe: Box<dyn DebugProbe>, name: &'static str },
    FirmwareRuntime(Box<dyn FirmwareRuntime>),
}

impl BackendSelection {
    /// Resolves an access method name.
    ///
    /// Debug probe methods (`dci`, `itpii`) cannot be resolved by name because the probe has to be supplied by the
    /// caller, and `uefi` only resolves when running inside the firmware on x86-64.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::DirectMemory),
            "winrwe" => Ok(Self::ExternalTool),
            "stub" => Ok(Self::Null),
            "uefi" => native_firmware_runtime(),
            "dci" | "itpii" => Err(AccessError::Configuration(format!(
                "access method '{name}' needs a debug probe, use BackendSelection::DebugProbe"
            ))),
            _ => Err(AccessError::Configuration(format!("unknown access method '{name}'"))),
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "uefi", target_arch = "x86_64"))] {
        fn native_firmware_runtime() -> Result<BackendSelection> {
            // Safety: firmware on x86-64 runs identity mapped at the highest privilege level.
            let runtime = unsafe { firmware_runtime::NativeRuntime::new() };
            Ok(BackendSelection::FirmwareRuntime(Box::new(runtime)))
        }
    } else {
        fn native_firmware_runtime() -> Result<BackendSelection> {
            Err(AccessError::NotSupported("uefi access outside of firmware"))
        }
    }
}

/// Constructs the selected backend.
pub fn open_backend(selection: BackendSelection, config: &AccessConfiguration) -> Result<Box<dyn AccessBackend>> {
    let backend: Box<dyn AccessBackend> = match selection {
        BackendSelection::DirectMemory => Box::new(DirectMemoryBackend::new(&config.direct_memory)?),
        BackendSelection::ExternalTool => Box::new(ExternalToolBackend::new(&config.external_tool)),
        BackendSelection::Null => Box::new(NullBackend),
        BackendSelection::DebugProbe { probe, name } => Box::new(DebugProbeBackend::new(probe, name)?),
        BackendSelection::FirmwareRuntime(runtime) => Box::new(FirmwareRuntimeBackend::new(runtime)),
    };
    log::info!(target: "xmlcli_access", "Using {} access", backend.name());
    Ok(backend)
}

/// Constructs the selected backend and opens a session over it, waiting for any other open session to end.
pub fn open_session(selection: BackendSelection, config: &AccessConfiguration) -> Result<AccessSession> {
    Ok(AccessSession::open(open_backend(selection, config)?))
}
