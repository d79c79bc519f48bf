//! The capability contract every access method implements.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::{fs, io::Write, path::Path, time::Duration};

use xmlcli_sdk::{base, Result};

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Port that raises a software SMI when written.
pub const SMI_TRIGGER_PORT: u16 = 0xB2;

/// Chipset reset control register.
pub const RESET_PORT: u16 = 0xCF9;

/// Value written to [`RESET_PORT`] for a warm reset.
pub const WARM_RESET_VALUE: u32 = 0x06;

/// Value written to [`RESET_PORT`] for a cold reset.
pub const COLD_RESET_VALUE: u32 = 0x0E;

/// Low level access to a target platform.
///
/// Memory values are little-endian. Scalar memory accesses accept sizes of 1, 2, 4 and 8 bytes, port accesses
/// 1, 2 and 4 bytes. Anything the access method cannot do fails with
/// [`AccessError::NotSupported`](xmlcli_sdk::AccessError::NotSupported).
///
/// The provided methods describe the behavior shared by most access methods and are overridden where a backend
/// has a native primitive.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait AccessBackend {
    /// Short access method name, used in log messages.
    fn name(&self) -> &'static str;

    /// Prepares the interface. Called every time an access session enters a new nesting level.
    fn attach(&mut self) -> Result<()> {
        Ok(())
    }

    /// Waits `delay`, then pauses the target CPU. Halting an already halted CPU is a no-op.
    fn halt_cpu(&mut self, delay: Duration) -> Result<()>;

    /// Resumes the target CPU if it is halted.
    fn run_cpu(&mut self) -> Result<()>;

    /// Returns whether the target CPU is currently running.
    fn is_cpu_running(&mut self) -> Result<bool>;

    fn mem_read(&mut self, address: u64, size: usize) -> Result<u64>;

    fn mem_write(&mut self, address: u64, size: usize, value: u64) -> Result<()>;

    /// Reads `size` bytes starting at `address`, in ascending address order.
    fn mem_block(&mut self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Writes `data` starting at `address`.
    fn mem_block_write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        for (offset, byte) in data.iter().enumerate() {
            self.mem_write(address + offset as u64, 1, u64::from(*byte))?;
        }
        Ok(())
    }

    /// Saves `size` bytes of memory at `address` into `filename`.
    fn mem_save(&mut self, filename: &Path, address: u64, size: usize) -> Result<()> {
        let data = self.mem_block(address, size)?;
        let mut file = fs::File::create(filename)?;
        file.write_all(&data)?;
        Ok(())
    }

    /// Loads the whole content of `filename` into memory at `address`.
    fn load_data(&mut self, filename: &Path, address: u64) -> Result<()> {
        let data = fs::read(filename)?;
        self.mem_block_write(address, &data)
    }

    fn read_io(&mut self, port: u16, size: usize) -> Result<u32>;

    fn write_io(&mut self, port: u16, size: usize, value: u32) -> Result<()>;

    /// Raises a software SMI by writing `value` to the SMI trigger port.
    fn trigger_smi(&mut self, value: u8) -> Result<()> {
        log::debug!(target: "xmlcli_access", "Triggering SMI {value:#04X} through {}", self.name());
        self.write_io(SMI_TRIGGER_PORT, 1, u32::from(value))
    }

    fn read_msr(&mut self, _thread: usize, _address: u32) -> Result<u64> {
        Err(xmlcli_sdk::AccessError::NotSupported("read_msr"))
    }

    fn write_msr(&mut self, _thread: usize, _address: u32, _value: u64) -> Result<()> {
        Err(xmlcli_sdk::AccessError::NotSupported("write_msr"))
    }

    fn warm_reset(&mut self) -> Result<()> {
        self.write_io(RESET_PORT, 1, WARM_RESET_VALUE)
    }

    fn cold_reset(&mut self) -> Result<()> {
        self.write_io(RESET_PORT, 1, COLD_RESET_VALUE)
    }

    /// Returns the SMM base address of the selected thread.
    fn read_sm_base(&mut self) -> Result<u64> {
        Err(xmlcli_sdk::AccessError::NotSupported("read_sm_base"))
    }
}

/// Reads a scalar out of a block read, for backends whose only memory primitive is a block transfer.
pub(crate) fn scalar_from_block(data: &[u8], size: usize) -> Result<u64> {
    base::validate_scalar_size(size)?;
    Ok(base::bytes_to_int(&data[..size.min(data.len())]))
}
