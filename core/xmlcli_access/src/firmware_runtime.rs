//! Access through firmware runtime services.
//!
//! Used when the access layer itself runs inside the firmware environment. The [`FirmwareRuntime`] trait is the
//! seam to whatever provides the services; [`NativeRuntime`] provides them directly on x86-64 with identity mapped
//! memory, port instructions and MSR instructions.
//!
//! MSR accesses always execute on the current processor; the thread index is ignored.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::{thread, time::Duration};

use xmlcli_sdk::{base, Result};

use crate::backend::AccessBackend;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Memory, I/O and MSR services of the firmware environment.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait FirmwareRuntime {
    fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>>;

    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<()>;

    fn read_io(&mut self, port: u16, size: usize) -> Result<u32>;

    fn write_io(&mut self, port: u16, size: usize, value: u32) -> Result<()>;

    fn read_msr(&mut self, address: u32) -> Result<u64>;

    fn write_msr(&mut self, address: u32, value: u64) -> Result<()>;
}

/// [`AccessBackend`] over a [`FirmwareRuntime`].
pub struct FirmwareRuntimeBackend {
    runtime: Box<dyn FirmwareRuntime>,
}

impl FirmwareRuntimeBackend {
    pub fn new(runtime: Box<dyn FirmwareRuntime>) -> Self {
        Self { runtime }
    }
}

impl AccessBackend for FirmwareRuntimeBackend {
    fn name(&self) -> &'static str {
        "uefi"
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
        let data = self.runtime.read_memory(address, size)?;
        Ok(base::bytes_to_int(&data[..size.min(data.len())]))
    }

    fn mem_write(&mut self, address: u64, size: usize, value: u64) -> Result<()> {
        base::validate_scalar_size(size)?;
        self.runtime.write_memory(address, &base::int_to_bytes(value, size))
    }

    fn mem_block(&mut self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.runtime.read_memory(address, size)
    }

    fn mem_block_write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        self.runtime.write_memory(address, data)
    }

    fn read_io(&mut self, port: u16, size: usize) -> Result<u32> {
        base::validate_port_size(size)?;
        self.runtime.read_io(port, size)
    }

    fn write_io(&mut self, port: u16, size: usize, value: u32) -> Result<()> {
        base::validate_port_size(size)?;
        self.runtime.write_io(port, size, value)
    }

    fn read_msr(&mut self, _thread: usize, address: u32) -> Result<u64> {
        self.runtime.read_msr(address)
    }

    fn write_msr(&mut self, _thread: usize, address: u32, value: u64) -> Result<()> {
        self.runtime.write_msr(address, value)
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        use x86_64::{instructions::port::Port, registers::model_specific::Msr};

        /// Firmware services implemented with direct instructions.
        pub struct NativeRuntime {
            _private: (),
        }

        impl NativeRuntime {
            /// ## Safety
            ///
            /// The caller must run with physical memory identity mapped, at a privilege level allowing port and MSR
            /// instructions, and must own the side effects of every access made through the runtime.
            pub unsafe fn new() -> Self {
                Self { _private: () }
            }
        }

        impl FirmwareRuntime for NativeRuntime {
            fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>> {
                let source = address as *const u8;
                // Safety: identity mapping is guaranteed by the constructor contract.
                Ok((0..size).map(|offset| unsafe { source.add(offset).read_volatile() }).collect())
            }

            fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<()> {
                let target = address as *mut u8;
                for (offset, byte) in data.iter().enumerate() {
                    // Safety: identity mapping is guaranteed by the constructor contract.
                    unsafe { target.add(offset).write_volatile(*byte) };
                }
                Ok(())
            }

            fn read_io(&mut self, port: u16, size: usize) -> Result<u32> {
                base::validate_port_size(size)?;
                // Safety: I/O privilege is guaranteed by the constructor contract.
                let value = unsafe {
                    match size {
                        1 => u32::from(Port::<u8>::new(port).read()),
                        2 => u32::from(Port::<u16>::new(port).read()),
                        _ => Port::<u32>::new(port).read(),
                    }
                };
                Ok(value)
            }

            fn write_io(&mut self, port: u16, size: usize, value: u32) -> Result<()> {
                base::validate_port_size(size)?;
                // Safety: I/O privilege is guaranteed by the constructor contract.
                unsafe {
                    match size {
                        1 => Port::<u8>::new(port).write(value as u8),
                        2 => Port::<u16>::new(port).write(value as u16),
                        _ => Port::<u32>::new(port).write(value),
                    }
                }
                Ok(())
            }

            fn read_msr(&mut self, address: u32) -> Result<u64> {
                // Safety: MSR privilege is guaranteed by the constructor contract.
                Ok(unsafe { Msr::new(address).read() })
            }

            fn write_msr(&mut self, address: u32, value: u64) -> Result<()> {
                // Safety: MSR privilege is guaranteed by the constructor contract.
                unsafe { Msr::new(address).write(value) };
                Ok(())
            }
        }
    }
}
