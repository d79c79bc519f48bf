//! A backend that does nothing, for dry runs.
//!
//! ## License
//!
//! Copyright (C) Intel Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::{path::Path, time::Duration};

use xmlcli_sdk::{base, Result};

use crate::backend::AccessBackend;

/// Reads return zero, writes are dropped. Only ever used when selected by name.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl AccessBackend for NullBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn halt_cpu(&mut self, _delay: Duration) -> Result<()> {
        Ok(())
    }

    fn run_cpu(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_cpu_running(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn mem_read(&mut self, _address: u64, size: usize) -> Result<u64> {
        base::validate_scalar_size(size)?;
        Ok(0)
    }

    fn mem_write(&mut self, _address: u64, size: usize, _value: u64) -> Result<()> {
        base::validate_scalar_size(size)
    }

    fn mem_block(&mut self, _address: u64, size: usize) -> Result<Vec<u8>> {
        Ok(vec![0; size])
    }

    fn mem_block_write(&mut self, _address: u64, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn mem_save(&mut self, _filename: &Path, _address: u64, _size: usize) -> Result<()> {
        Ok(())
    }

    fn load_data(&mut self, _filename: &Path, _address: u64) -> Result<()> {
        Ok(())
    }

    fn read_io(&mut self, _port: u16, size: usize) -> Result<u32> {
        base::validate_port_size(size)?;
        Ok(0)
    }

    fn write_io(&mut self, _port: u16, size: usize, _value: u32) -> Result<()> {
        base::validate_port_size(size)
    }

    fn read_msr(&mut self, _thread: usize, _address: u32) -> Result<u64> {
        Ok(0)
    }

    fn write_msr(&mut self, _thread: usize, _address: u32, _value: u64) -> Result<()> {
        Ok(())
    }

    fn read_sm_base(&mut self) -> Result<u64> {
        Ok(0)
    }
}
