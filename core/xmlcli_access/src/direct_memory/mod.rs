//! Access through a physical memory device file.
//!
//! Memory is reached by mapping the device file one page at a time; every mapping and the device descriptor are
//! released before the operation returns, whether it succeeded or not. Port I/O goes through the native port helper
//! library when one is configured, and through the port instructions otherwise.
//!
//! The host CPU running this code is the target, so it is never actually halted.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(unix)]
mod mapping;
mod native;

use std::{path::PathBuf, thread, time::Duration};

use xmlcli_sdk::{base, config::DirectMemoryConfiguration, AccessError, Result};

use crate::{backend::AccessBackend, window::MemoryWindow};
use native::{MemoryLibrary, PortLibrary};

/// [`AccessBackend`] over a physical memory device file and optional native helper libraries.
pub struct DirectMemoryBackend {
    memory_file: PathBuf,
    port_library: Option<PortLibrary>,
    memory_library: Option<MemoryLibrary>,
    io_privilege: bool,
}

impl DirectMemoryBackend {
    /// Creates the backend, loading the configured helper libraries.
    ///
    /// ## Errors
    ///
    /// [`AccessError::Configuration`] when `external_mem` is set without `lib_mem`, and
    /// [`AccessError::DeviceIo`] when a helper library cannot be loaded or lacks an export.
    pub fn new(config: &DirectMemoryConfiguration) -> Result<Self> {
        let port_library = config.lib_port.as_deref().map(PortLibrary::open).transpose()?;
        let memory_library = match (config.external_mem, config.lib_mem.as_deref()) {
            (true, Some(path)) => Some(MemoryLibrary::open(path)?),
            (true, None) => {
                return Err(AccessError::Configuration("external_mem is set but lib_mem is not".into()));
            }
            (false, _) => None,
        };

        log::debug!(target: "xmlcli_access", "Direct memory access through {}", config.memory_file.display());
        Ok(Self { memory_file: config.memory_file.clone(), port_library, memory_library, io_privilege: false })
    }

    fn read_window(&self, window: MemoryWindow) -> Result<Vec<u8>> {
        if let Some(library) = &self.memory_library {
            let mut data = vec![0u8; window.length];
            library.read(window.base, &mut data)?;
            return Ok(data);
        }
        self.read_mapped(window)
    }

    fn write_window(&self, address: u64, data: &[u8]) -> Result<()> {
        if let Some(library) = &self.memory_library {
            return library.write(address, data);
        }
        self.write_mapped(MemoryWindow::new(address, data.len()), data)
    }

    fn port_read(&mut self, port: u16, size: usize) -> Result<u32> {
        if let Some(library) = &self.port_library {
            return library.read(port, size);
        }
        self.instruction_read(port, size)
    }

    fn port_write(&mut self, port: u16, size: usize, value: u32) -> Result<()> {
        if let Some(library) = &self.port_library {
            return library.write(port, size, value);
        }
        self.instruction_write(port, size, value)
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        impl DirectMemoryBackend {
            fn read_mapped(&self, window: MemoryWindow) -> Result<Vec<u8>> {
                let chunks = window.chunks()?;
                let mut data = vec![0u8; window.length];
                let device = mapping::open_device(&self.memory_file)?;
                for chunk in chunks {
                    let page = mapping::PageMapping::new(&device, chunk.page)?;
                    page.read(chunk.offset, &mut data[chunk.position..chunk.position + chunk.length]);
                }
                Ok(data)
            }

            fn write_mapped(&self, window: MemoryWindow, data: &[u8]) -> Result<()> {
                let chunks = window.chunks()?;
                let device = mapping::open_device(&self.memory_file)?;
                for chunk in chunks {
                    let page = mapping::PageMapping::new(&device, chunk.page)?;
                    page.write(chunk.offset, &data[chunk.position..chunk.position + chunk.length]);
                }
                Ok(())
            }
        }
    } else {
        impl DirectMemoryBackend {
            fn read_mapped(&self, _window: MemoryWindow) -> Result<Vec<u8>> {
                Err(AccessError::NotSupported("mem_block"))
            }

            fn write_mapped(&self, _window: MemoryWindow, _data: &[u8]) -> Result<()> {
                Err(AccessError::NotSupported("mem_block_write"))
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"))] {
        use x86_64::instructions::port::Port;

        impl DirectMemoryBackend {
            /// Grants the process access to every I/O port, once.
            fn ensure_io_privilege(&mut self) -> Result<()> {
                if !self.io_privilege {
                    // Safety: raising the I/O privilege level only affects this process.
                    if unsafe { libc::iopl(3) } != 0 {
                        return Err(AccessError::device_io("iopl", std::io::Error::last_os_error()));
                    }
                    self.io_privilege = true;
                }
                Ok(())
            }

            fn instruction_read(&mut self, port: u16, size: usize) -> Result<u32> {
                self.ensure_io_privilege()?;
                // Safety: the process holds I/O privilege; the caller owns the side effects of the access.
                let value = unsafe {
                    match size {
                        1 => u32::from(Port::<u8>::new(port).read()),
                        2 => u32::from(Port::<u16>::new(port).read()),
                        _ => Port::<u32>::new(port).read(),
                    }
                };
                Ok(value)
            }

            fn instruction_write(&mut self, port: u16, size: usize, value: u32) -> Result<()> {
                self.ensure_io_privilege()?;
                // Safety: the process holds I/O privilege; the caller owns the side effects of the access.
                unsafe {
                    match size {
                        1 => Port::<u8>::new(port).write(value as u8),
                        2 => Port::<u16>::new(port).write(value as u16),
                        _ => Port::<u32>::new(port).write(value),
                    }
                }
                Ok(())
            }
        }
    } else {
        impl DirectMemoryBackend {
            fn instruction_read(&mut self, _port: u16, _size: usize) -> Result<u32> {
                let _ = self.io_privilege;
                Err(AccessError::NotSupported("read_io"))
            }

            fn instruction_write(&mut self, _port: u16, _size: usize, _value: u32) -> Result<()> {
                Err(AccessError::NotSupported("write_io"))
            }
        }
    }
}

impl AccessBackend for DirectMemoryBackend {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn halt_cpu(&mut self, delay: Duration) -> Result<()> {
        thread::sleep(delay);
        Ok(())
    }

    fn run_cpu(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_cpu_running(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn mem_read(&mut self, address: u64, size: usize) -> Result<u64> {
        base::validate_scalar_size(size)?;
        let data = self.read_window(MemoryWindow::new(address, size))?;
        Ok(base::bytes_to_int(&data))
    }

    fn mem_write(&mut self, address: u64, size: usize, value: u64) -> Result<()> {
        base::validate_scalar_size(size)?;
        self.write_window(address, &base::int_to_bytes(value, size))
    }

    fn mem_block(&mut self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.read_window(MemoryWindow::new(address, size))
    }

    fn mem_block_write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        self.write_window(address, data)
    }

    fn read_io(&mut self, port: u16, size: usize) -> Result<u32> {
        base::validate_port_size(size)?;
        self.port_read(port, size)
    }

    fn write_io(&mut self, port: u16, size: usize, value: u32) -> Result<()> {
        base::validate_port_size(size)?;
        self.port_write(port, size, value)
    }
}
